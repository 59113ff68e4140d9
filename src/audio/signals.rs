// Signals from the audio side back to the registry owner
// Audio callbacks only enqueue; the owner drains and mutates state

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Handle of one player instance. Never reused within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub enum VoiceSignal {
    /// Reached end of media during the given playback session
    Ended { session: u64 },
    /// Playback stopped by a device or stream failure
    Failed(String),
}

/// Process-wide audio session notifications the registry subscribes to
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    InterruptionBegan,
    InterruptionEnded { should_resume: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Voice { voice: VoiceId, signal: VoiceSignal },
    Session(SessionEvent),
}

pub type SignalReceiver = UnboundedReceiver<Signal>;

pub fn signal_channel() -> (UnboundedSender<Signal>, SignalReceiver) {
    mpsc::unbounded_channel()
}

/// Sender bound to a single voice, handed to the engine on open
#[derive(Debug, Clone)]
pub struct SignalSender {
    voice: VoiceId,
    tx: UnboundedSender<Signal>,
}

impl SignalSender {
    pub fn new(voice: VoiceId, tx: UnboundedSender<Signal>) -> Self {
        Self { voice, tx }
    }

    pub fn voice(&self) -> VoiceId {
        self.voice
    }

    /// Non-blocking, safe to call from the audio callback.
    /// A closed channel means the registry is gone, so the signal is dropped.
    pub fn send(&self, signal: VoiceSignal) {
        let _ = self.tx.send(Signal::Voice {
            voice: self.voice,
            signal,
        });
    }
}

/// Entry point for platform session observers (interruptions)
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: UnboundedSender<Signal>,
}

impl SessionHandle {
    pub fn new(tx: UnboundedSender<Signal>) -> Self {
        Self { tx }
    }

    pub fn notify(&self, event: SessionEvent) {
        let _ = self.tx.send(Signal::Session(event));
    }
}
