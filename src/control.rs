//! Pause / quit control for the capture loop.
//!
//! Commands travel from a `ControlSource` (the console, or a script in tests)
//! to the capture loop over an `mpsc` channel. The listener runs on its own
//! thread and only ever sends; the `Controller` on the loop side is the single
//! owner of the pause / quit state.

use std::io::{BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Upper bound on how long a pause or quit request can go unnoticed while waiting.
pub const TICK_POLL: Duration = Duration::from_millis(100);
/// Poll period while paused.
pub const PAUSE_POLL: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    TogglePause,
    Quit,
}

impl Command {
    /// Parse one console line (`P` / `Q`, case-insensitive, surrounding whitespace ignored).
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_uppercase().as_str() {
            "P" => Some(Command::TogglePause),
            "Q" => Some(Command::Quit),
            _ => None,
        }
    }
}

/// A blocking producer of control commands.
pub trait ControlSource: Send {
    /// Block until the next command. `None` means the input is closed.
    fn next_command(&mut self) -> Option<Command>;
}

/// One event from the interactive console.
///
/// Stdin lines and Ctrl-C share one channel, so whoever reads the console
/// (a startup prompt or the capture listener) sees an interrupt in order
/// with the typed input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsoleInput {
    Line(String),
    /// End of input or a read error. Nothing follows from the reader.
    Closed,
    /// Ctrl-C.
    Interrupted,
}

/// Read `reader` line by line on a detached thread, forwarding each line.
///
/// Sends `Closed` once the input ends and then stops.
pub fn spawn_console_reader<R>(
    mut reader: R,
    sender: Sender<ConsoleInput>,
) -> std::io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("console-reader".to_string())
        .spawn(move || loop {
            let mut line = String::new();
            let input = match reader.read_line(&mut line) {
                Ok(0) => ConsoleInput::Closed,
                Ok(_) => ConsoleInput::Line(line),
                Err(err) => {
                    log::warn!("console input closed: {}", err);
                    ConsoleInput::Closed
                }
            };
            let closed = input == ConsoleInput::Closed;
            if sender.send(input).is_err() || closed {
                break;
            }
        })
}

/// Console commands read from the shared console channel.
///
/// `Interrupted` maps to `Quit`; a closed console ends the source.
pub struct ConsoleControl {
    input: Receiver<ConsoleInput>,
}

impl ConsoleControl {
    pub fn new(input: Receiver<ConsoleInput>) -> Self {
        Self { input }
    }
}

impl ControlSource for ConsoleControl {
    fn next_command(&mut self) -> Option<Command> {
        loop {
            let line = match self.input.recv() {
                Ok(ConsoleInput::Line(line)) => line,
                Ok(ConsoleInput::Interrupted) => return Some(Command::Quit),
                Ok(ConsoleInput::Closed) | Err(_) => return None,
            };
            match Command::parse(&line) {
                Some(command) => return Some(command),
                None => log::warn!(
                    "invalid input {:?}. Press 'P' to pause/resume or 'Q' to quit.",
                    line.trim()
                ),
            }
        }
    }
}

/// A fixed sequence of commands, each sent after its delay.
pub struct ScriptedControl {
    steps: std::vec::IntoIter<(Duration, Command)>,
}

impl ScriptedControl {
    pub fn new(steps: Vec<(Duration, Command)>) -> Self {
        Self {
            steps: steps.into_iter(),
        }
    }
}

impl ControlSource for ScriptedControl {
    fn next_command(&mut self) -> Option<Command> {
        let (delay, command) = self.steps.next()?;
        thread::sleep(delay);
        Some(command)
    }
}

/// Print the control help to `out`.
pub fn print_controls(out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "Controls")?;
    writeln!(out, "Press 'P' then Enter to pause/resume capture")?;
    writeln!(out, "Press 'Q' then Enter to quit")
}

/// Run `source` on a detached background thread, forwarding commands to `sender`.
///
/// Closing the input counts as a quit request. The thread stops after
/// forwarding `Quit` or once the receiving side is gone.
pub fn spawn_listener(
    mut source: Box<dyn ControlSource>,
    sender: Sender<Command>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("control-listener".to_string())
        .spawn(move || loop {
            let command = source.next_command().unwrap_or(Command::Quit);
            if sender.send(command).is_err() || command == Command::Quit {
                break;
            }
        })
}

/// What ended a wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The full interval passed.
    Elapsed,
    /// A pause started during the wait and has since been lifted.
    Resumed,
    /// Quit was requested.
    Quit,
}

/// Loop-side view of the command channel.
pub struct Controller {
    receiver: Receiver<Command>,
    paused: bool,
    quit: bool,
    disconnected: bool,
}

impl Controller {
    pub fn new(receiver: Receiver<Command>) -> Self {
        Self {
            receiver,
            paused: false,
            quit: false,
            disconnected: false,
        }
    }

    /// A controller plus the sender feeding it.
    pub fn channel() -> (Sender<Command>, Self) {
        let (sender, receiver) = mpsc::channel();
        (sender, Self::new(receiver))
    }

    pub fn quit_requested(&self) -> bool {
        self.quit
    }

    /// Apply every command already queued.
    pub fn poll(&mut self) {
        loop {
            match self.receiver.try_recv() {
                Ok(command) => self.apply(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    break;
                }
            }
        }
    }

    /// Wait up to `interval`, reacting to commands within `TICK_POLL`.
    ///
    /// A pause during the wait blocks until resume and then returns
    /// `Resumed` right away so the next tick is not delayed further.
    pub fn wait(&mut self, interval: Duration) -> WaitOutcome {
        let deadline = Instant::now() + interval;
        loop {
            self.poll();
            if self.quit {
                return WaitOutcome::Quit;
            }
            if self.paused {
                return self.block_while_paused();
            }
            let now = Instant::now();
            if now >= deadline {
                return WaitOutcome::Elapsed;
            }
            self.recv_for((deadline - now).min(TICK_POLL));
        }
    }

    /// Block while paused, polling every `PAUSE_POLL`.
    pub fn block_while_paused(&mut self) -> WaitOutcome {
        self.poll();
        if !self.paused {
            return if self.quit {
                WaitOutcome::Quit
            } else {
                WaitOutcome::Elapsed
            };
        }
        log::info!("capture paused; press 'P' to resume or 'Q' to quit");
        while self.paused && !self.quit {
            if self.disconnected {
                log::warn!("control input closed while paused; stopping capture");
                self.quit = true;
                break;
            }
            self.recv_for(PAUSE_POLL);
        }
        if self.quit {
            WaitOutcome::Quit
        } else {
            WaitOutcome::Resumed
        }
    }

    fn recv_for(&mut self, timeout: Duration) {
        if self.disconnected {
            thread::sleep(timeout);
            return;
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(command) => self.apply(command),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => self.disconnected = true,
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Quit => {
                if !self.quit {
                    log::info!("quitting capture");
                }
                self.quit = true;
            }
            Command::TogglePause => {
                self.paused = !self.paused;
                if self.paused {
                    log::info!("pausing capture...");
                } else {
                    log::info!("resuming capture...");
                }
            }
        }
    }
}
