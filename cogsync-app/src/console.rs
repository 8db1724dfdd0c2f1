use cogsync_core::ColorWord;
use cogsync_experiment::{InputEvent, Presenter};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

const RESET: &str = "\x1b[0m";
const KEYS: &str = "(f = match, j = no match)";
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Terminal presentation. Answers are typed as `f` (match) or `j` (no match)
/// followed by Enter; `q` or end of input cancels the session.
pub struct ConsolePresenter {
    input: Receiver<InputEvent>,
}

impl ConsolePresenter {
    pub fn spawn() -> io::Result<Self> {
        let (tx, rx) = channel::unbounded();
        thread::Builder::new()
            .name("console-input".into())
            .spawn(move || {
                for line in io::stdin().lock().lines() {
                    let Ok(line) = line else { break };
                    if tx.send(parse_key(&line)).is_err() {
                        return;
                    }
                }
                let _ = tx.send(InputEvent::Cancel);
            })?;
        Ok(Self { input: rx })
    }

    fn flush() {
        let _ = io::stdout().flush();
    }
}

fn parse_key(line: &str) -> InputEvent {
    match line.trim().to_ascii_lowercase().as_str() {
        "f" => InputEvent::Classify(true),
        "j" => InputEvent::Classify(false),
        "q" | "quit" | "esc" => InputEvent::Cancel,
        _ => InputEvent::Other,
    }
}

impl Presenter for ConsolePresenter {
    fn show_message(&mut self, text: &str) {
        print!("{CLEAR_SCREEN}");
        println!("{text}");
        Self::flush();
    }

    fn show_countdown(&mut self, label: &str, remaining: Duration) {
        println!("{label}: {} s remaining", remaining.as_secs());
        Self::flush();
    }

    fn show_stimulus(&mut self, stimulus: &ColorWord, round: u32, trial: u32) {
        let [r, g, b] = stimulus.color.rgb;
        println!(
            "\n[round {round}, trial {trial}]   \x1b[1;38;2;{r};{g};{b}m{}{RESET}   {KEYS}",
            stimulus.word
        );
        Self::flush();
    }

    fn clear(&mut self) {
        print!("{CLEAR_SCREEN}");
        Self::flush();
    }

    fn poll_input(&mut self, timeout: Duration) -> Option<InputEvent> {
        if timeout.is_zero() {
            return match self.input.try_recv() {
                Ok(event) => Some(event),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => Some(InputEvent::Cancel),
            };
        }
        match self.input.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(InputEvent::Cancel),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_to_answers() {
        assert_eq!(parse_key("f"), InputEvent::Classify(true));
        assert_eq!(parse_key(" J \r"), InputEvent::Classify(false));
        assert_eq!(parse_key("q"), InputEvent::Cancel);
        assert_eq!(parse_key("space"), InputEvent::Other);
    }
}
