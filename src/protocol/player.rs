// src/protocol/player.rs

//! Real-time playback of pre-calculated [`TimedAction`]s.
//!
//! A [`Player`] owns one script. Every call to [`Player::play`] spawns a
//! playback task that sleeps until the next action is due, emits it on the
//! returned stream and listens for control commands (stop, pause, resume,
//! skip) in between. Only one playback task runs per player at any time.

use log::{debug, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::AbortHandle;
use tokio::time::{self, Instant};
use tokio_stream::wrappers::ReceiverStream;

use super::action::{Action, TimedAction};
use crate::error::{Error, Result};

/// Maximum time a control command may take to be picked up by the
/// playback task.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(1);

/// Operations a player supports besides play and stop. Fixed when the
/// player is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub pause: bool,
    pub skip: bool,
    pub dump: bool,
}

impl Capabilities {
    pub const ALL: Capabilities = Capabilities {
        pause: true,
        skip: true,
        dump: true,
    };

    pub const PLAY_ONLY: Capabilities = Capabilities {
        pause: false,
        skip: false,
        dump: false,
    };
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities::ALL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bounds {
    low: i32,
    high: i32,
}

impl Bounds {
    /// Returns `None` for an invalid pair, which leaves values unclamped.
    fn new(low: i32, high: i32) -> Option<Self> {
        if low >= high {
            return None;
        }
        Some(Self { low, high })
    }

    fn apply(&self, value: u8) -> u8 {
        (value as i32).clamp(self.low, self.high).clamp(0, 100) as u8
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Limits {
    latency: Duration,
    position: Option<Bounds>,
    speed: Option<Bounds>,
}

impl Limits {
    fn apply(&self, action: Action) -> Action {
        Action {
            position: self
                .position
                .map_or(action.position, |b| b.apply(action.position)),
            speed: self.speed.map_or(action.speed, |b| b.apply(action.speed)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Stop,
    Pause,
    Resume,
    Skip(Duration),
}

struct Control {
    command: Command,
    done: oneshot::Sender<()>,
}

/// Plays back a script of timed actions in real time.
pub struct Player {
    script: Arc<[TimedAction]>,
    capabilities: Capabilities,
    limits: Limits,
    // Serializes play() calls.
    starting: AsyncMutex<()>,
    session: Mutex<Option<Session>>,
}

/// Handles to the current (or last) playback task. The task owns the
/// receiving end of `ctrl`, so a closed channel means it has finished.
struct Session {
    ctrl: mpsc::Sender<Control>,
    task: AbortHandle,
}

impl Player {
    pub fn new(script: Vec<TimedAction>) -> Self {
        Self {
            script: script.into(),
            capabilities: Capabilities::ALL,
            limits: Limits::default(),
            starting: AsyncMutex::new(()),
            session: Mutex::new(None),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Number of actions in the loaded script.
    pub fn len(&self) -> usize {
        self.script.len()
    }

    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }

    /// Delays every emitted action by `latency`.
    pub fn latency(&mut self, latency: Duration) {
        self.limits.latency = latency;
    }

    /// Clamps emitted positions into `low..=high`. An invalid pair is ignored.
    pub fn limit_position(&mut self, low: i32, high: i32) {
        match Bounds::new(low, high) {
            Some(bounds) => self.limits.position = Some(bounds),
            None => debug!("Ignoring invalid position limits {}-{}", low, high),
        }
    }

    /// Clamps emitted speeds into `slow..=fast`. An invalid pair is ignored.
    pub fn limit_speed(&mut self, slow: i32, fast: i32) {
        match Bounds::new(slow, fast) {
            Some(bounds) => self.limits.speed = Some(bounds),
            None => debug!("Ignoring invalid speed limits {}-{}", slow, fast),
        }
    }

    /// Starts playback from the beginning of the script.
    ///
    /// Waits for a previous playback task of this player to finish before
    /// starting a new one. The returned stream ends when the script is
    /// exhausted or playback is stopped.
    pub async fn play(&self) -> ReceiverStream<Action> {
        let _starting = self.starting.lock().await;

        if let Some(previous) = self.current_session() {
            previous.closed().await;
        }

        let (out_tx, out_rx) = mpsc::channel(1);
        let (ctrl_tx, ctrl_rx) = mpsc::channel(1);
        let task = tokio::spawn(playback_loop(
            Arc::clone(&self.script),
            self.limits,
            out_tx,
            ctrl_rx,
        ));
        *self.lock_session() = Some(Session {
            ctrl: ctrl_tx,
            task: task.abort_handle(),
        });

        ReceiverStream::new(out_rx)
    }

    pub fn is_playing(&self) -> bool {
        self.lock_session()
            .as_ref()
            .map_or(false, |session| !session.ctrl.is_closed())
    }

    /// Cancels the playback task without waiting for it to acknowledge.
    /// The output stream ends and the next [`Player::play`] can start at once.
    pub fn abort(&self) {
        if let Some(session) = self.lock_session().as_ref() {
            session.task.abort();
        }
    }

    /// Stops playback and resets the player. Succeeds when nothing is playing.
    pub async fn stop(&self) -> Result<()> {
        match self.send_command(Command::Stop).await {
            Err(Error::NotPlaying) => Ok(()),
            result => result,
        }
    }

    /// Halts playback at the current position.
    pub async fn pause(&self) -> Result<()> {
        if !self.capabilities.pause {
            return Err(Error::NotSupported);
        }
        self.send_command(Command::Pause).await
    }

    /// Continues playback from the paused position.
    pub async fn resume(&self) -> Result<()> {
        if !self.capabilities.pause {
            return Err(Error::NotSupported);
        }
        self.send_command(Command::Resume).await
    }

    /// Jumps to `position` in the script, forwards or backwards.
    ///
    /// The script is rescanned from the start, which is O(n) per skip.
    pub async fn skip(&self, position: Duration) -> Result<()> {
        if !self.capabilities.skip {
            return Err(Error::NotSupported);
        }
        self.send_command(Command::Skip(position)).await
    }

    /// Returns the full loaded script.
    pub fn dump(&self) -> Result<Vec<TimedAction>> {
        if !self.capabilities.dump {
            return Err(Error::NotSupported);
        }
        Ok(self.script.to_vec())
    }

    async fn send_command(&self, command: Command) -> Result<()> {
        let ctrl = self
            .current_session()
            .filter(|ctrl| !ctrl.is_closed())
            .ok_or(Error::NotPlaying)?;

        let (done_tx, done_rx) = oneshot::channel();
        let delivery = async {
            ctrl.send(Control {
                command,
                done: done_tx,
            })
            .await
            .map_err(|_| Error::NotPlaying)?;
            done_rx.await.map_err(|_| Error::NotPlaying)
        };

        match time::timeout(COMMAND_TIMEOUT, delivery).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Playback did not accept {:?} within {:?}", command, COMMAND_TIMEOUT);
                Err(Error::Timeout)
            }
        }
    }

    fn current_session(&self) -> Option<mpsc::Sender<Control>> {
        self.lock_session().as_ref().map(|session| session.ctrl.clone())
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Plays `script` to `out`, controlled through `ctrl`.
async fn playback_loop(
    script: Arc<[TimedAction]>,
    limits: Limits,
    out: mpsc::Sender<Action>,
    mut ctrl: mpsc::Receiver<Control>,
) {
    let mut cursor = 0; // next action in script
    let mut anchor_time = Instant::now(); // when playback started/resumed
    let mut anchor_position = Duration::ZERO; // script time at anchor_time
    let mut paused = false;

    while cursor < script.len() {
        let next = script[cursor];
        let delay = (next.time + limits.latency)
            .saturating_sub(script_position(anchor_time, anchor_position));

        tokio::select! {
            control = ctrl.recv() => {
                let Some(control) = control else {
                    // Player was dropped.
                    return;
                };
                match control.command {
                    Command::Stop => {
                        debug!("Playback stopped at {:?}", script_position(anchor_time, anchor_position));
                        let _ = control.done.send(());
                        return;
                    }
                    Command::Pause => {
                        if !paused {
                            paused = true;
                            anchor_position = script_position(anchor_time, anchor_position);
                        }
                    }
                    Command::Resume => {
                        if paused {
                            paused = false;
                            anchor_time = Instant::now();
                        }
                    }
                    Command::Skip(position) => {
                        anchor_time = Instant::now();
                        anchor_position = position;
                        cursor = script
                            .iter()
                            .position(|ta| ta.time >= position)
                            .unwrap_or(script.len());
                    }
                }
                let _ = control.done.send(());
            }
            _ = time::sleep(delay), if !paused => {
                if out.send(limits.apply(next.action)).await.is_err() {
                    debug!("Playback output closed, ending playback");
                    return;
                }
                cursor += 1;
            }
        }
    }
}

/// Current timecode in the script given when and where playback was anchored.
fn script_position(anchor_time: Instant, anchor_position: Duration) -> Duration {
    anchor_position + anchor_time.elapsed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn script() -> Vec<TimedAction> {
        vec![
            TimedAction::new(Duration::from_millis(50), 5, 50),
            TimedAction::new(Duration::from_millis(100), 50, 40),
            TimedAction::new(Duration::from_millis(150), 90, 90),
            TimedAction::new(Duration::from_millis(200), 30, 30),
        ]
    }

    fn assert_roughly(got: Duration, want: Duration) {
        let diff = if got > want { got - want } else { want - got };
        assert!(
            diff <= Duration::from_millis(2),
            "want {:?}, got {:?}",
            want,
            got
        );
    }

    #[tokio::test(start_paused = true)]
    async fn plays_all_actions_on_time() {
        let player = Player::new(script());
        let start = Instant::now();
        let played: Vec<Action> = player.play().await.collect().await;

        let want: Vec<Action> = script().iter().map(|ta| ta.action).collect();
        assert_eq!(played, want);
        assert_roughly(start.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_resume_delay_playback() {
        let player = Arc::new(Player::new(script()));
        let pause_time = Duration::from_millis(100);

        let mut stream = player.play().await;
        let control = Arc::clone(&player);
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(100)).await;
            control.pause().await.unwrap();
            time::sleep(pause_time).await;
            control.resume().await.unwrap();
        });

        let start = Instant::now();
        let mut count = 0;
        while stream.next().await.is_some() {
            count += 1;
        }

        assert_eq!(count, 4);
        assert_roughly(start.elapsed(), Duration::from_millis(200) + pause_time);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_keeps_actions_delayed_by_latency() {
        let mut player = Player::new(vec![
            TimedAction::new(Duration::from_millis(100), 10, 50),
            TimedAction::new(Duration::from_millis(200), 90, 50),
        ]);
        player.latency(Duration::from_millis(30));
        let player = Arc::new(player);

        let stream = player.play().await;
        let control = Arc::clone(&player);
        tokio::spawn(async move {
            // Past the second action's script time, before its emission.
            time::sleep(Duration::from_millis(210)).await;
            control.pause().await.unwrap();
            time::sleep(Duration::from_millis(100)).await;
            control.resume().await.unwrap();
        });

        let start = Instant::now();
        let played: Vec<Action> = stream.collect().await;

        assert_eq!(played, vec![Action::new(10, 50), Action::new(90, 50)]);
        assert_roughly(start.elapsed(), Duration::from_millis(330));
    }

    #[tokio::test(start_paused = true)]
    async fn play_waits_for_running_session() {
        let player = Player::new(script());
        let start = Instant::now();

        let mut first = player.play().await;
        let drain = tokio::spawn(async move {
            let mut count = 0;
            while first.next().await.is_some() {
                count += 1;
            }
            count
        });

        let second = player.play().await;
        assert_roughly(start.elapsed(), Duration::from_millis(200));
        assert_eq!(drain.await.unwrap(), 4);

        let played: Vec<Action> = second.collect().await;
        assert_eq!(played.len(), 4);
        assert_roughly(start.elapsed(), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn abort_ends_session_at_once() {
        let player = Player::new(script());
        let mut first = player.play().await;
        time::sleep(Duration::from_millis(10)).await;

        player.abort();
        assert_eq!(first.next().await, None);

        let start = Instant::now();
        let second = time::timeout(Duration::from_millis(5), player.play())
            .await
            .expect("play waited for the aborted session");
        assert_roughly(start.elapsed(), Duration::ZERO);
        assert!(player.is_playing());
        drop(second);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_playback() {
        let player = Arc::new(Player::new(script()));
        let stop_time = Duration::from_millis(75);

        let stream = player.play().await;
        let control = Arc::clone(&player);
        tokio::spawn(async move {
            time::sleep(stop_time).await;
            control.stop().await.unwrap();
        });

        let start = Instant::now();
        let played: Vec<Action> = stream.collect().await;

        assert_eq!(played, vec![Action::new(5, 50)]);
        assert_roughly(start.elapsed(), stop_time);
        assert!(!player.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn skip_moves_playback_position() {
        let cases = [
            ("forward", 50u64, 150u64),
            ("backward", 150, 50),
        ];
        for (name, at, to) in cases {
            let player = Arc::new(Player::new(script()));
            let stream = player.play().await;
            let control = Arc::clone(&player);
            tokio::spawn(async move {
                time::sleep(Duration::from_millis(at)).await;
                control.skip(Duration::from_millis(to)).await.unwrap();
            });

            let start = Instant::now();
            let _: Vec<Action> = stream.collect().await;

            let want = (200 - (to as i64 - at as i64)) as u64;
            let elapsed = start.elapsed();
            let diff = (elapsed.as_millis() as i64 - want as i64).abs();
            assert!(diff <= 2, "{}: want {}ms, got {:?}", name, want, elapsed);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn latency_delays_emission() {
        let mut player = Player::new(script());
        player.latency(Duration::from_millis(30));
        let start = Instant::now();
        let _: Vec<Action> = player.play().await.collect().await;
        assert_roughly(start.elapsed(), Duration::from_millis(230));
    }

    #[tokio::test(start_paused = true)]
    async fn limits_clamp_emitted_actions() {
        let mut player = Player::new(script());
        player.limit_position(10, 80);
        player.limit_speed(35, 45);
        let played: Vec<Action> = player.play().await.collect().await;
        assert_eq!(
            played,
            vec![
                Action::new(10, 45),
                Action::new(50, 40),
                Action::new(80, 45),
                Action::new(30, 35),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_limits_are_ignored() {
        let mut player = Player::new(script());
        player.limit_position(80, 10);
        player.limit_speed(50, 50);
        let played: Vec<Action> = player.play().await.collect().await;
        let want: Vec<Action> = script().iter().map(|ta| ta.action).collect();
        assert_eq!(played, want);
    }

    #[tokio::test(start_paused = true)]
    async fn controls_require_playback() {
        let player = Player::new(script());
        assert!(player.stop().await.is_ok());
        assert!(matches!(player.pause().await, Err(Error::NotPlaying)));
        assert!(matches!(player.resume().await, Err(Error::NotPlaying)));
        assert!(matches!(
            player.skip(Duration::from_millis(10)).await,
            Err(Error::NotPlaying)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_capabilities_are_reported() {
        let player = Player::new(script()).with_capabilities(Capabilities::PLAY_ONLY);
        let _stream = player.play().await;
        assert!(matches!(player.pause().await, Err(Error::NotSupported)));
        assert!(matches!(player.resume().await, Err(Error::NotSupported)));
        assert!(matches!(
            player.skip(Duration::ZERO).await,
            Err(Error::NotSupported)
        ));
        assert!(matches!(player.dump(), Err(Error::NotSupported)));
        assert!(player.stop().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn unresponsive_playback_times_out() {
        let player = Player::new(script());
        // Nobody reads the stream, so the task blocks on its second action.
        let _stream = player.play().await;
        time::sleep(Duration::from_millis(150)).await;
        assert!(matches!(player.pause().await, Err(Error::Timeout)));
    }

    #[tokio::test(start_paused = true)]
    async fn replay_starts_from_the_beginning() {
        let player = Player::new(script());
        let first: Vec<Action> = player.play().await.collect().await;
        let second: Vec<Action> = player.play().await.collect().await;
        assert_eq!(first, second);
        assert_eq!(second.len(), 4);
    }

    #[test]
    fn dump_returns_script() {
        let player = Player::new(script());
        assert_eq!(player.dump().unwrap(), script());
    }
}
