/// Cancellable timers that report back into an actor mailbox.
pub mod timer;
