//! Transport seam.

use tokio::sync::mpsc;

use crate::TransportError;

/// Writes frames to the device link.
///
/// Each call carries exactly one frame. Inbound bytes are fed to
/// [`DeviceSession::on_receive`](crate::DeviceSession::on_receive).
pub trait Transport: Send {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        (**self).send(frame)
    }
}

/// Transport that forwards frames over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        ChannelTransport { tx }
    }

    /// A transport plus the receiver its frames arrive on.
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelTransport { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.tx
            .send(frame.to_vec())
            .map_err(|_| TransportError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_transport() {
        let (mut transport, mut rx) = ChannelTransport::pair();
        transport.send(&[1, 2, 3]).unwrap();
        assert_eq!(rx.try_recv().unwrap(), vec![1, 2, 3]);

        drop(rx);
        assert_eq!(transport.send(&[4]), Err(TransportError::Closed));
    }
}
