// Host boundary command handlers
// Every command takes primitive arguments and returns a value or a structured error
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::assets::SoundSource;
use crate::error::AudioError;
use crate::registry::{PlaybackInfo, SoundRegistry};
use crate::state::AppState;

/// Error returned across the host boundary
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{code}: {message}")]
pub struct CommandError {
    pub code: String,
    pub message: String,
}

impl CommandError {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }

    fn invalid_arguments(method: &str, err: impl std::fmt::Display) -> Self {
        Self::new("InvalidArguments", format!("{}: {}", method, err))
    }
}

impl From<AudioError> for CommandError {
    fn from(err: AudioError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

/// Run `f` on the registry after applying any queued engine signals
fn with_registry<T>(state: &AppState, f: impl FnOnce(&mut SoundRegistry) -> T) -> T {
    let mut registry = state.registry.lock();
    registry.pump_signals();
    f(&mut *registry)
}

pub fn play(state: &AppState, source: String, looping: bool) -> CommandResult<()> {
    let source = SoundSource::parse(&source);
    with_registry(state, |r| r.play(&source, looping)).map_err(CommandError::from)
}

pub fn play_named(state: &AppState, identifier: String) -> CommandResult<()> {
    with_registry(state, |r| r.play_named(&identifier)).map_err(CommandError::from)
}

pub fn load(state: &AppState, source: String) -> CommandResult<()> {
    let source = SoundSource::parse(&source);
    with_registry(state, |r| r.load(&source)).map_err(CommandError::from)
}

pub fn load_named(state: &AppState, identifier: String) -> CommandResult<()> {
    with_registry(state, |r| r.load_named(&identifier)).map_err(CommandError::from)
}

pub fn pause(state: &AppState) -> CommandResult<()> {
    with_registry(state, |r| r.pause());
    Ok(())
}

pub fn resume(state: &AppState) -> CommandResult<()> {
    with_registry(state, |r| r.resume());
    Ok(())
}

pub fn stop(state: &AppState) -> CommandResult<()> {
    with_registry(state, |r| r.stop());
    Ok(())
}

pub fn seek(state: &AppState, seconds: f64) -> CommandResult<()> {
    with_registry(state, |r| r.seek(seconds)).map_err(CommandError::from)
}

pub fn set_volume(state: &AppState, volume: f32) -> CommandResult<()> {
    with_registry(state, |r| r.set_volume(volume));
    Ok(())
}

pub fn set_number_of_loops(state: &AppState, loops: i32) -> CommandResult<()> {
    with_registry(state, |r| r.set_number_of_loops(loops));
    Ok(())
}

pub fn get_info(state: &AppState) -> CommandResult<Option<PlaybackInfo>> {
    Ok(with_registry(state, |r| r.info()))
}

pub fn unload_named(state: &AppState, identifier: String) -> CommandResult<bool> {
    Ok(with_registry(state, |r| r.unload_named(&identifier)))
}

pub fn teardown(state: &AppState) -> CommandResult<()> {
    with_registry(state, |r| r.teardown());
    Ok(())
}

/// Start `source` on the primary player after `delay_seconds`. The call
/// returns immediately, so load failures surface only as `OnSetupError`.
pub fn play_with_delay(state: &AppState, source: String, delay_seconds: f64) -> CommandResult<()> {
    if !delay_seconds.is_finite() || delay_seconds < 0.0 {
        return Err(CommandError::invalid_arguments(
            "playWithDelay",
            format!("delay must be a non-negative number of seconds, got {}", delay_seconds),
        ));
    }

    let delay = Duration::from_secs_f64(delay_seconds);
    let registry = Arc::clone(&state.registry);
    let task = move || {
        let mut registry = registry.lock();
        registry.pump_signals();
        if let Err(e) = registry.play(&SoundSource::parse(&source), false) {
            warn!("Delayed play of {} failed: {}", source, e);
        }
    };

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                tokio::time::sleep(delay).await;
                task();
            });
        }
        Err(_) => {
            std::thread::spawn(move || {
                std::thread::sleep(delay);
                task();
            });
        }
    }
    Ok(())
}

// ===== Dispatch by name =====

#[derive(Deserialize)]
struct SourceArgs {
    source: String,
    #[serde(default, rename = "loop")]
    looping: bool,
}

#[derive(Deserialize)]
struct IdentifierArgs {
    identifier: String,
}

#[derive(Deserialize)]
struct SeekArgs {
    seconds: f64,
}

#[derive(Deserialize)]
struct VolumeArgs {
    volume: f32,
}

#[derive(Deserialize)]
struct LoopsArgs {
    loops: i32,
}

#[derive(Deserialize)]
struct DelayArgs {
    source: String,
    delay: f64,
}

fn parse_args<T: DeserializeOwned>(method: &str, args: Value) -> CommandResult<T> {
    serde_json::from_value(args).map_err(|e| CommandError::invalid_arguments(method, e))
}

fn to_value<T: Serialize>(value: T) -> CommandResult<Value> {
    serde_json::to_value(value).map_err(|e| CommandError::new("Internal", e.to_string()))
}

/// Invoke a command by its host-facing name with a JSON object of arguments
pub fn dispatch(state: &AppState, method: &str, args: Value) -> CommandResult<Value> {
    debug!("Dispatching {}", method);
    match method {
        "play" => {
            let a: SourceArgs = parse_args(method, args)?;
            play(state, a.source, a.looping).and_then(to_value)
        }
        "playNamed" => {
            let a: IdentifierArgs = parse_args(method, args)?;
            play_named(state, a.identifier).and_then(to_value)
        }
        "load" => {
            let a: SourceArgs = parse_args(method, args)?;
            load(state, a.source).and_then(to_value)
        }
        "loadNamed" => {
            let a: IdentifierArgs = parse_args(method, args)?;
            load_named(state, a.identifier).and_then(to_value)
        }
        "pause" => pause(state).and_then(to_value),
        "resume" => resume(state).and_then(to_value),
        "stop" => stop(state).and_then(to_value),
        "seek" => {
            let a: SeekArgs = parse_args(method, args)?;
            seek(state, a.seconds).and_then(to_value)
        }
        "setVolume" => {
            let a: VolumeArgs = parse_args(method, args)?;
            set_volume(state, a.volume).and_then(to_value)
        }
        "setNumberOfLoops" => {
            let a: LoopsArgs = parse_args(method, args)?;
            set_number_of_loops(state, a.loops).and_then(to_value)
        }
        "getInfo" => get_info(state).and_then(to_value),
        "unloadNamed" => {
            let a: IdentifierArgs = parse_args(method, args)?;
            unload_named(state, a.identifier).and_then(to_value)
        }
        "teardown" => teardown(state).and_then(to_value),
        "playWithDelay" => {
            let a: DelayArgs = parse_args(method, args)?;
            play_with_delay(state, a.source, a.delay).and_then(to_value)
        }
        other => Err(CommandError::new("UnknownMethod", format!("no such method: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{FakeEngine, MemoryResolver};
    use crate::events::{PlaybackState, PlayerEvent};
    use crate::settings::PlayerSettings;
    use parking_lot::Mutex;
    use serde_json::json;

    fn app() -> (AppState, FakeEngine, Arc<Mutex<Vec<PlayerEvent>>>) {
        let engine = FakeEngine::default();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let registry = SoundRegistry::new(
            Box::new(engine.clone()),
            Arc::new(
                MemoryResolver::default()
                    .with_source("a.mp3", "3.0")
                    .with_named("click", "0.2"),
            ),
            Arc::new(move |event: PlayerEvent| sink.lock().push(event)),
        );
        (AppState::new(registry, PlayerSettings::default(), None), engine, events)
    }

    #[test]
    fn test_dispatch_play_and_info() {
        let (state, _engine, _events) = app();
        assert_eq!(dispatch(&state, "play", json!({ "source": "a.mp3", "loop": true })), Ok(Value::Null));
        assert_eq!(dispatch(&state, "seek", json!({ "seconds": 1.5 })), Ok(Value::Null));

        let info = dispatch(&state, "getInfo", Value::Null).unwrap();
        assert_eq!(info, json!({ "currentTime": 1.5, "duration": 3.0 }));
        assert_eq!(state.registry.lock().primary_state(), Some(PlaybackState::Playing));
    }

    #[test]
    fn test_dispatch_info_without_player_is_null() {
        let (state, _engine, _events) = app();
        assert_eq!(dispatch(&state, "getInfo", json!({})), Ok(Value::Null));
    }

    #[test]
    fn test_dispatch_errors_are_structured() {
        let (state, _engine, _events) = app();

        let err = dispatch(&state, "playNamed", json!({ "identifier": "nope" })).unwrap_err();
        assert_eq!(err.code, "SourceUnavailable");

        dispatch(&state, "play", json!({ "source": "a.mp3" })).unwrap();
        let err = dispatch(&state, "seek", json!({ "seconds": 99 })).unwrap_err();
        assert_eq!(err.code, "InvalidPosition");

        let err = dispatch(&state, "seek", json!({ "position": 1 })).unwrap_err();
        assert_eq!(err.code, "InvalidArguments");

        let err = dispatch(&state, "setSpeaker", json!({ "on": true })).unwrap_err();
        assert_eq!(err.code, "UnknownMethod");

        let serialized = serde_json::to_value(&err).unwrap();
        assert_eq!(serialized["code"], "UnknownMethod");
    }

    #[test]
    fn test_commands_apply_pending_signals_first() {
        let (state, engine, events) = app();
        play(&state, "a.mp3".into(), false).unwrap();
        engine.finish(engine.last_opened().unwrap());

        // Any command drains the queue before it runs
        set_volume(&state, 0.5).unwrap();
        assert!(events.lock().contains(&PlayerEvent::FinishedPlaying {
            identifier: "a.mp3".into(),
            success: true
        }));
    }

    #[test]
    fn test_named_commands() {
        let (state, engine, _events) = app();
        dispatch(&state, "loadNamed", json!({ "identifier": "click" })).unwrap();
        dispatch(&state, "playNamed", json!({ "identifier": "click" })).unwrap();
        assert_eq!(engine.open_count(), 1);

        assert_eq!(dispatch(&state, "unloadNamed", json!({ "identifier": "click" })), Ok(json!(true)));
        assert_eq!(dispatch(&state, "unloadNamed", json!({ "identifier": "click" })), Ok(json!(false)));
    }

    #[test]
    fn test_transport_and_loops_commands() {
        let (state, _engine, _events) = app();
        dispatch(&state, "load", json!({ "source": "a.mp3" })).unwrap();
        dispatch(&state, "setNumberOfLoops", json!({ "loops": -1 })).unwrap();
        dispatch(&state, "resume", Value::Null).unwrap();
        dispatch(&state, "pause", Value::Null).unwrap();
        assert_eq!(state.registry.lock().primary_state(), Some(PlaybackState::Paused));
        dispatch(&state, "stop", Value::Null).unwrap();
        dispatch(&state, "setVolume", json!({ "volume": 4 })).unwrap();

        let registry = state.registry.lock();
        assert_eq!(registry.primary_state(), Some(PlaybackState::Stopped));
        assert_eq!(registry.volume(), 1.0);
        assert_eq!(registry.loop_count(), crate::registry::LoopCount::Forever);
    }

    #[test]
    fn test_teardown_command() {
        let (state, engine, _events) = app();
        play(&state, "a.mp3".into(), false).unwrap();
        let voice = engine.last_opened().unwrap();
        dispatch(&state, "teardown", Value::Null).unwrap();
        assert!(engine.voice(voice).released);
    }

    #[test]
    fn test_play_with_delay_rejects_negative_delay() {
        let (state, _engine, _events) = app();
        let err = play_with_delay(&state, "a.mp3".into(), -1.0).unwrap_err();
        assert_eq!(err.code, "InvalidArguments");
    }

    #[tokio::test]
    async fn test_play_with_delay_starts_later() {
        let (state, _engine, events) = app();
        dispatch(&state, "playWithDelay", json!({ "source": "a.mp3", "delay": 0.05 })).unwrap();
        assert_eq!(state.registry.lock().primary_state(), None);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(state.registry.lock().primary_state(), Some(PlaybackState::Playing));
        assert!(events.lock().contains(&PlayerEvent::StateChanged {
            identifier: "a.mp3".into(),
            state: PlaybackState::Playing
        }));
    }

    #[tokio::test]
    async fn test_play_with_delay_failure_is_event() {
        let (state, _engine, events) = app();
        play_with_delay(&state, "missing.mp3".into(), 0.0).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(events
            .lock()
            .iter()
            .any(|e| matches!(e, PlayerEvent::SetupError { .. })));
    }
}
