use std::time::Duration;
use tokio::{
    sync::mpsc::UnboundedSender,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

/// Generation number stamped onto every event a timer posts. It changes on
/// every arm and cancel, so events from an earlier arming can be told apart.
pub type TimerTicket = u64;

/// A single logical timer that posts events into a mailbox. The slot holds at
/// most one armed timer: arming always cancels whatever was armed before, and
/// cancelling an empty or already fired slot does nothing.
///
/// Aborting the tokio task is not enough on its own, the timer may already
/// have queued its event before the abort. Every event therefore carries the
/// ticket it was armed with and the owner checks it with
/// [`TimerSlot::fire`] or [`TimerSlot::is_current`] before acting on it.
#[derive(Debug)]
pub struct TimerSlot {
    /// Name used in logs.
    name: &'static str,
    /// Ticket of the currently armed timer.
    generation: TimerTicket,
    /// Task driving the armed timer, `None` when disarmed.
    handle: Option<JoinHandle<()>>,
}

impl TimerSlot {
    /// Create an empty slot.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            generation: 0,
            handle: None,
        }
    }

    /// Name of the slot.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True while a timer is armed and has not been consumed.
    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    /// Arm a one shot timer posting `event(ticket)` after `delay`.
    pub fn arm_once<E, F>(&mut self, delay: Duration, mailbox: &UnboundedSender<E>, event: F)
    where
        E: Send + 'static,
        F: FnOnce(TimerTicket) -> E + Send + 'static,
    {
        let ticket = self.rearm();
        let mailbox = mailbox.clone();
        self.handle = Some(tokio::spawn(async move {
            time::sleep(delay).await;
            // The receiver only goes away once the owner has stopped.
            let _ = mailbox.send(event(ticket));
        }));
    }

    /// Arm a recurring timer posting `event(ticket)` every `period`. The first
    /// event is posted one full period after arming.
    pub fn arm_every<E, F>(&mut self, period: Duration, mailbox: &UnboundedSender<E>, event: F)
    where
        E: Send + 'static,
        F: Fn(TimerTicket) -> E + Send + 'static,
    {
        let ticket = self.rearm();
        let mailbox = mailbox.clone();
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if mailbox.send(event(ticket)).is_err() {
                    break;
                }
            }
        }));
    }

    /// Disarm the slot. Returns true if a timer was armed.
    pub fn cancel(&mut self) -> bool {
        self.generation = self.generation.wrapping_add(1);
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Consume the event of a one shot timer. Returns true only for the
    /// ticket of the armed timer, after which the slot is disarmed.
    pub fn fire(&mut self, ticket: TimerTicket) -> bool {
        if self.is_current(ticket) {
            self.handle = None;
            true
        } else {
            false
        }
    }

    /// Check an event of a recurring timer. The slot stays armed.
    pub fn is_current(&self, ticket: TimerTicket) -> bool {
        self.is_armed() && ticket == self.generation
    }

    fn rearm(&mut self) -> TimerTicket {
        self.cancel();
        self.generation
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    /// The paused clock lands on millisecond ticks, allow for the rounding.
    fn assert_close(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(5),
            "Expected roughly {expected:?}, got {actual:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_fires_once_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new("settle");
        let start = Instant::now();

        slot.arm_once(Duration::from_millis(2600), &tx, |ticket| ticket);
        assert!(slot.is_armed());

        let ticket = rx.recv().await.expect("Timer did not fire");
        assert_close(start.elapsed(), Duration::from_millis(2600));
        assert!(slot.fire(ticket));
        assert!(!slot.is_armed(), "One shot should disarm on fire");
        assert!(!slot.fire(ticket), "A ticket can only be consumed once");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_discards_earlier_ticket() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new("sweep");

        slot.arm_once(Duration::ZERO, &tx, |ticket| ticket);
        // Let the first timer queue its event before it is replaced.
        time::sleep(Duration::from_millis(1)).await;
        slot.arm_once(Duration::from_secs(10), &tx, |ticket| ticket);

        let stale = rx.recv().await.expect("First timer did not fire");
        assert!(!slot.fire(stale), "Event from a replaced timer must be ignored");
        assert!(slot.is_armed());

        let fresh = rx.recv().await.expect("Second timer did not fire");
        assert!(slot.fire(fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel::<TimerTicket>();
        let mut slot = TimerSlot::new("settle");

        slot.arm_once(Duration::from_secs(1), &tx, |ticket| ticket);
        assert!(slot.cancel());
        assert!(!slot.cancel(), "Second cancel should be a no-op");

        time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err(), "Cancelled timer posted an event");
    }

    #[tokio::test(start_paused = true)]
    async fn test_recurring_timer_keeps_ticking_until_cancelled() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new("capture");
        let start = Instant::now();

        slot.arm_every(Duration::from_millis(2500), &tx, |ticket| ticket);
        for n in 1..=3u32 {
            let ticket = rx.recv().await.expect("Interval did not tick");
            assert!(slot.is_current(ticket));
            assert_close(start.elapsed(), Duration::from_millis(2500) * n);
        }

        slot.cancel();
        time::sleep(Duration::from_secs(30)).await;
        while let Ok(ticket) = rx.try_recv() {
            assert!(!slot.is_current(ticket), "Tick after cancel was accepted");
        }
    }

    #[test]
    fn test_cancel_on_empty_slot_is_noop() {
        let mut slot = TimerSlot::new("capture");
        assert!(!slot.cancel());
        assert!(!slot.is_armed());
        assert!(!slot.is_current(0));
        assert_eq!(slot.name(), "capture");
    }
}
