//! The bounded, cancellable row queue between a producing iterator
//! and its consumer. Everything that moves rows between pipeline
//! stages goes through one of these.

use log::error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::row::Row;
use crate::source::RowIter;

/// Queue bound between any two stages. A full queue blocks the
/// producer; an empty, unclosed queue blocks the consumer.
pub const ROW_QUEUE_CAPACITY: usize = 100;

pub fn row_channel() -> (mpsc::Sender<Row>, mpsc::Receiver<Row>) {
    mpsc::channel(ROW_QUEUE_CAPACITY)
}

/// Adapts a pull iterator into a push queue driven by its own tokio
/// task. The queue closes when the iterator ends, when it faults, or
/// when the token fires, whichever comes first. Consumers never need
/// to know which.
pub fn iter_channel(iter: RowIter, token: CancellationToken) -> mpsc::Receiver<Row> {
    let (tx, rx) = row_channel();
    tokio::spawn(drive_iter(iter, tx, token));
    rx
}

/// Offers rows until the iterator is done. Cancellation takes
/// priority over a pending send, so a cancelled query stops even when
/// the consumer has walked away and the queue sits full. An iterator
/// fault is logged and closes the queue; it never reaches the
/// consumer as anything but end-of-stream.
pub async fn drive_iter(mut iter: RowIter, tx: mpsc::Sender<Row>, token: CancellationToken) {
    loop {
        let row = match iter.next() {
            None => return,
            Some(Err(err)) => {
                error!("row iterator failed: {}", err);
                return;
            }
            Some(Ok(row)) => row,
        };
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            sent = tx.send(row) => {
                // Consumer dropped its receiver; stop producing.
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}
