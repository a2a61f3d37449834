use std::collections::HashMap;

use crate::error::MuxError;
use crate::service::Service;
use crate::services::{
    CalendarService, HealthService, MusicService, NotificationService, ScheduleService,
    SystemService, WeatherService,
};

/// Services keyed by command type, in registration order.
///
/// The key set is fixed once the registry is handed to a multiplexer.
#[derive(Default)]
pub struct ServiceRegistry {
    pub(crate) services: Vec<Box<dyn Service>>,
    index: HashMap<u8, usize>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service. Fails if its command type is already taken.
    pub fn register(mut self, service: impl Service) -> Result<Self, MuxError> {
        self.insert(Box::new(service))?;
        Ok(self)
    }

    pub fn insert(&mut self, service: Box<dyn Service>) -> Result<(), MuxError> {
        let command_type = service.command_type();
        if self.index.contains_key(&command_type) {
            return Err(MuxError::DuplicateService(command_type));
        }
        self.index.insert(command_type, self.services.len());
        self.services.push(service);
        Ok(())
    }

    /// Every shipped service, in initialization order.
    pub fn standard() -> Result<Self, MuxError> {
        Self::new()
            .register(MusicService::new())?
            .register(HealthService::new())?
            .register(NotificationService::new())?
            .register(ScheduleService::new())?
            .register(WeatherService::new())?
            .register(SystemService::new())?
            .register(CalendarService::new())
    }

    pub fn get(&self, command_type: u8) -> Option<&dyn Service> {
        self.index
            .get(&command_type)
            .map(|&i| self.services[i].as_ref())
    }

    pub(crate) fn position(&self, command_type: u8) -> Option<usize> {
        self.index.get(&command_type).copied()
    }

    /// Command types in registration order.
    pub fn command_types(&self) -> impl Iterator<Item = u8> + '_ {
        self.services.iter().map(|s| s.command_type())
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.services.iter().map(|s| (s.command_type(), s.name())))
            .finish()
    }
}
