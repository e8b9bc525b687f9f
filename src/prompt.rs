//! Interactive startup prompts.
//!
//! Every prompt has a default: an empty answer takes it, and so does invalid
//! input. Ctrl-C or a closed console at any prompt takes the defaults for that
//! prompt and every later one, with a note saying so.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::time::Duration;

use crate::config::interval_from_secs;
use crate::control::ConsoleInput;

pub struct Prompter<'a, W> {
    input: &'a Receiver<ConsoleInput>,
    output: W,
    defaults_only: bool,
}

impl<'a, W: Write> Prompter<'a, W> {
    /// Prompt on `output`, reading answers from the shared console channel.
    pub fn new(input: &'a Receiver<ConsoleInput>, output: W) -> Self {
        Self {
            input,
            output,
            defaults_only: false,
        }
    }

    /// Whether an interrupt or closed console switched the prompter to defaults.
    pub fn using_defaults(&self) -> bool {
        self.defaults_only
    }

    pub fn output_dir(&mut self, default: &Path) -> PathBuf {
        let question = format!(
            "Enter output directory (default: '{}'): ",
            default.display()
        );
        match self.ask(&question) {
            Some(answer) if !answer.is_empty() => PathBuf::from(answer),
            _ => default.to_path_buf(),
        }
    }

    pub fn interval(&mut self, default: Duration) -> Duration {
        let question = format!(
            "Enter capture interval in seconds (default: {}): ",
            default.as_secs_f64()
        );
        let answer = match self.ask(&question) {
            Some(answer) if !answer.is_empty() => answer,
            _ => return default,
        };
        match answer.parse::<f64>().ok().and_then(interval_from_secs) {
            Some(interval) => interval,
            None => {
                self.note(&format!(
                    "Invalid interval {:?}; using default of {}s..",
                    answer,
                    default.as_secs_f64()
                ));
                default
            }
        }
    }

    /// `None` once the console is interrupted or closed.
    fn ask(&mut self, question: &str) -> Option<String> {
        if self.defaults_only {
            return None;
        }
        let _ = write!(self.output, "{}", question);
        let _ = self.output.flush();
        match self.input.recv() {
            Ok(ConsoleInput::Line(line)) => Some(line.trim().to_string()),
            Ok(ConsoleInput::Interrupted) | Ok(ConsoleInput::Closed) | Err(_) => {
                self.defaults_only = true;
                self.note("Using default settings..");
                None
            }
        }
    }

    fn note(&mut self, message: &str) {
        let _ = writeln!(self.output);
        let _ = writeln!(self.output, "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::{self, Sender};

    fn console(lines: &[&str]) -> (Sender<ConsoleInput>, Receiver<ConsoleInput>) {
        let (sender, receiver) = mpsc::channel();
        for line in lines {
            sender
                .send(ConsoleInput::Line(format!("{}\n", line)))
                .unwrap();
        }
        (sender, receiver)
    }

    #[test]
    fn empty_answers_take_defaults() {
        let (_sender, input) = console(&["", ""]);
        let mut p = Prompter::new(&input, Vec::new());
        assert_eq!(
            p.output_dir(Path::new("captured_images")),
            PathBuf::from("captured_images")
        );
        assert_eq!(p.interval(Duration::from_secs(2)), Duration::from_secs(2));
        assert!(!p.using_defaults());
    }

    #[test]
    fn answers_are_trimmed_and_used() {
        let (_sender, input) = console(&["  shots ", " 0.5"]);
        let mut p = Prompter::new(&input, Vec::new());
        assert_eq!(
            p.output_dir(Path::new("captured_images")),
            PathBuf::from("shots")
        );
        assert_eq!(p.interval(Duration::from_secs(2)), Duration::from_millis(500));
    }

    #[test]
    fn invalid_interval_falls_back_for_that_field_only() {
        let (_sender, input) = console(&["shots", "soon"]);
        let mut p = Prompter::new(&input, Vec::new());
        assert_eq!(p.output_dir(Path::new("out")), PathBuf::from("shots"));
        assert_eq!(p.interval(Duration::from_secs(2)), Duration::from_secs(2));
        assert!(!p.using_defaults());

        let (_sender, input) = console(&["-3"]);
        let mut p = Prompter::new(&input, Vec::new());
        assert_eq!(p.interval(Duration::from_secs(2)), Duration::from_secs(2));
        let shown = String::from_utf8(p.output).unwrap();
        assert!(shown.contains("Invalid interval"));
    }

    #[test]
    fn interrupt_takes_defaults_for_remaining_prompts() {
        let (sender, input) = console(&[]);
        sender.send(ConsoleInput::Interrupted).unwrap();
        // A line typed after the interrupt must not be taken as an answer.
        sender.send(ConsoleInput::Line("7\n".to_string())).unwrap();

        let mut p = Prompter::new(&input, Vec::new());
        assert_eq!(p.output_dir(Path::new("out")), PathBuf::from("out"));
        assert_eq!(p.interval(Duration::from_secs(3)), Duration::from_secs(3));
        assert!(p.using_defaults());

        let shown = String::from_utf8(p.output).unwrap();
        assert!(shown.contains("Using default settings.."));
        assert!(!shown.contains("capture interval"));
    }

    #[test]
    fn interrupt_while_waiting_unblocks_the_prompt() {
        let (sender, input) = console(&[]);
        let interrupter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            sender.send(ConsoleInput::Interrupted).unwrap();
            sender
        });

        let mut p = Prompter::new(&input, Vec::new());
        assert_eq!(p.output_dir(Path::new("out")), PathBuf::from("out"));
        assert!(p.using_defaults());
        drop(interrupter.join().unwrap());
    }

    #[test]
    fn closed_console_falls_back() {
        let (sender, input) = console(&[]);
        sender.send(ConsoleInput::Closed).unwrap();
        let mut p = Prompter::new(&input, Vec::new());
        assert_eq!(p.output_dir(Path::new("out")), PathBuf::from("out"));
        assert_eq!(p.interval(Duration::from_secs(3)), Duration::from_secs(3));
    }
}
