use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{FusedStream, Stream, StreamExt};
use priority_queue::PriorityQueue;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Work scheduled on the [`Timer`].
pub trait TimerEvent: Send + 'static {
    /// Returns `false` if the event became obsolete after it was armed.
    ///
    /// Invalid events are dropped when they come due instead of being executed.
    fn is_valid(&self) -> bool;

    /// Runs the event.
    ///
    /// The returned future is spawned on the runtime, so a slow event does not hold up other
    /// due events. It may arm new events on the timer.
    fn execute(self: Box<Self>) -> BoxFuture<'static, ()>;
}

/// Identifies an armed timer event for cancellation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

enum Command {
    Arm(TimerHandle, Instant, Box<dyn TimerEvent>),
    Cancel(TimerHandle),
}

/// Handle to the timer service.
///
/// The service runs as one task on the runtime and fires armed events when they come due. It is
/// shared by all scrape schedulers of an agent. Cloning the handle is cheap; the service stops
/// once all handles are dropped and discards pending events.
#[derive(Clone)]
pub struct Timer {
    tx: mpsc::UnboundedSender<Command>,
    next_handle: Arc<AtomicU64>,
}

impl Timer {
    /// Starts the timer service on the current runtime.
    pub fn start() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(TimerService::new(rx).run());

        Self {
            tx,
            next_handle: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Arms `event` to fire at `when`.
    ///
    /// Deadlines in the past fire immediately.
    pub fn arm(&self, when: Instant, event: Box<dyn TimerEvent>) -> TimerHandle {
        let handle = TimerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        if self.tx.send(Command::Arm(handle, when, event)).is_err() {
            gleaner_log::debug!("timer service stopped, dropping timer event");
        }
        handle
    }

    /// Removes an armed event before it fires.
    ///
    /// Cancelling an event that already fired or was cancelled is a no-op.
    pub fn cancel(&self, handle: TimerHandle) {
        self.tx.send(Command::Cancel(handle)).ok();
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

struct TimerService {
    rx: mpsc::UnboundedReceiver<Command>,
    queue: DeadlineQueue<TimerHandle>,
    events: HashMap<TimerHandle, Box<dyn TimerEvent>>,
}

impl TimerService {
    fn new(rx: mpsc::UnboundedReceiver<Command>) -> Self {
        Self {
            rx,
            queue: DeadlineQueue::new(),
            events: HashMap::new(),
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                command = self.rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(handle) = self.queue.next() => self.fire(handle),
            }
        }

        gleaner_log::debug!(pending = self.events.len(), "timer service stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Arm(handle, when, event) => {
                self.queue.schedule(when, handle);
                self.events.insert(handle, event);
            }
            Command::Cancel(handle) => {
                self.queue.remove(&handle);
                self.events.remove(&handle);
            }
        }
    }

    fn fire(&mut self, handle: TimerHandle) {
        let Some(event) = self.events.remove(&handle) else {
            return;
        };

        if event.is_valid() {
            tokio::spawn(event.execute());
        }
    }
}

/// Deadline ordered queue yielding values once their deadline has passed.
///
/// Every value is scheduled at most once, scheduling it again moves its deadline.
struct DeadlineQueue<T: std::hash::Hash + Eq> {
    queue: PriorityQueue<T, Reverse<Instant>>,
    sleep: Pin<Box<tokio::time::Sleep>>,
}

impl<T: std::hash::Hash + Eq> DeadlineQueue<T> {
    fn new() -> Self {
        Self {
            queue: PriorityQueue::new(),
            sleep: Box::pin(tokio::time::sleep(Duration::MAX)),
        }
    }

    fn schedule(&mut self, when: Instant, value: T) {
        self.queue.push(value, Reverse(when));
    }

    fn remove(&mut self, value: &T) {
        self.queue.remove(value);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.queue.len()
    }

    fn peek_when(&self) -> Option<Instant> {
        self.queue.peek().map(|(_, Reverse(when))| *when)
    }
}

impl<T: std::hash::Hash + Eq> Unpin for DeadlineQueue<T> {}

impl<T: std::hash::Hash + Eq> FusedStream for DeadlineQueue<T> {
    fn is_terminated(&self) -> bool {
        // The stream never returns `Poll::Ready(None)`.
        false
    }
}

impl<T: std::hash::Hash + Eq> Stream for DeadlineQueue<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(when) = self.peek_when() else {
            return Poll::Pending;
        };

        // The head of the queue changed, reset the deadline.
        if self.sleep.deadline() != when {
            self.sleep.as_mut().reset(when);
        }

        if self.sleep.as_mut().poll(cx).is_pending() {
            return Poll::Pending;
        }

        match self.queue.pop() {
            Some((value, _)) => Poll::Ready(Some(value)),
            None => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use parking_lot::Mutex;

    use super::*;

    /// Records the instant it fired at and optionally re-arms itself.
    struct Recorder {
        timer: Timer,
        fired: Arc<Mutex<Vec<Instant>>>,
        valid: Arc<AtomicBool>,
        rearm: Option<Duration>,
    }

    impl TimerEvent for Recorder {
        fn is_valid(&self) -> bool {
            self.valid.load(Ordering::SeqCst)
        }

        fn execute(self: Box<Self>) -> BoxFuture<'static, ()> {
            Box::pin(async move {
                let now = Instant::now();
                self.fired.lock().push(now);
                if let Some(period) = self.rearm {
                    let timer = self.timer.clone();
                    timer.arm(now + period, self);
                }
            })
        }
    }

    fn recorder(
        timer: &Timer,
        rearm: Option<Duration>,
    ) -> (Box<Recorder>, Arc<Mutex<Vec<Instant>>>) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let event = Box::new(Recorder {
            timer: timer.clone(),
            fired: fired.clone(),
            valid: Arc::new(AtomicBool::new(true)),
            rearm,
        });
        (event, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_yields_in_deadline_order() {
        let start = Instant::now();
        let mut queue = DeadlineQueue::new();

        queue.schedule(start + Duration::from_millis(300), "c");
        queue.schedule(start + Duration::from_millis(100), "a");
        queue.schedule(start + Duration::from_millis(200), "b");
        queue.schedule(start + Duration::from_millis(400), "d");
        queue.remove(&"d");
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.next().await, Some("a"));
        assert_eq!((Instant::now() - start).as_millis(), 100);
        assert_eq!(queue.next().await, Some("b"));
        assert_eq!(queue.next().await, Some("c"));
        assert_eq!((Instant::now() - start).as_millis(), 300);
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_reschedule_moves_deadline() {
        let start = Instant::now();
        let mut queue = DeadlineQueue::new();

        queue.schedule(start + Duration::from_millis(100), "a");
        queue.schedule(start + Duration::from_millis(500), "a");
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.next().await, Some("a"));
        assert_eq!((Instant::now() - start).as_millis(), 500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_at_deadline() {
        let timer = Timer::start();
        let start = Instant::now();

        let (event, fired) = recorder(&timer, None);
        timer.arm(start + Duration::from_secs(5), event);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(fired.lock().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let offsets: Vec<_> = fired.lock().iter().map(|at| (*at - start).as_millis()).collect();
        assert_eq!(offsets, vec![5_000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_cancel() {
        let timer = Timer::start();
        let start = Instant::now();

        let (event, fired) = recorder(&timer, None);
        let handle = timer.arm(start + Duration::from_secs(1), event);
        timer.cancel(handle);
        // Cancelling twice is fine.
        timer.cancel(handle);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_skips_invalid_event() {
        let timer = Timer::start();
        let start = Instant::now();

        let (event, fired) = recorder(&timer, None);
        let valid = event.valid.clone();
        timer.arm(start + Duration::from_secs(1), event);
        valid.store(false, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_rearm_from_event() {
        let timer = Timer::start();
        let start = Instant::now();

        let (event, fired) = recorder(&timer, Some(Duration::from_secs(10)));
        timer.arm(start + Duration::from_secs(1), event);

        tokio::time::sleep(Duration::from_millis(31_500)).await;
        let offsets: Vec<_> = fired.lock().iter().map(|at| (*at - start).as_millis()).collect();
        assert_eq!(offsets, vec![1_000, 11_000, 21_000, 31_000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_past_deadline_fires_immediately() {
        let timer = Timer::start();
        tokio::time::sleep(Duration::from_secs(5)).await;
        let now = Instant::now();

        let (event, fired) = recorder(&timer, None);
        timer.arm(now - Duration::from_secs(3), event);

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(fired.lock().len(), 1);
    }
}
