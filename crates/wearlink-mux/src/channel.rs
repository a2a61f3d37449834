use tokio::sync::mpsc;

use crate::error::MuxError;

/// The single outbound command channel shared by every service.
pub trait CommandChannel: Send {
    fn write(&mut self, bytes: Vec<u8>) -> Result<(), MuxError>;
}

impl<T: CommandChannel + ?Sized> CommandChannel for Box<T> {
    fn write(&mut self, bytes: Vec<u8>) -> Result<(), MuxError> {
        (**self).write(bytes)
    }
}

/// Channel backed by an unbounded tokio mpsc sender.
#[derive(Debug, Clone)]
pub struct ChannelWriter {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelWriter {
    pub fn new(tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self { tx }
    }

    /// A writer and the receiver that observes its writes.
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl CommandChannel for ChannelWriter {
    fn write(&mut self, bytes: Vec<u8>) -> Result<(), MuxError> {
        self.tx
            .send(bytes)
            .map_err(|_| MuxError::Channel("receiver dropped".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_keep_order() {
        let (mut writer, mut rx) = ChannelWriter::pair();
        writer.write(vec![1]).unwrap();
        writer.write(vec![2]).unwrap();
        assert_eq!(rx.try_recv().unwrap(), vec![1]);
        assert_eq!(rx.try_recv().unwrap(), vec![2]);

        drop(rx);
        assert!(matches!(writer.write(vec![3]), Err(MuxError::Channel(_))));
    }
}
