use cogsync_core::ColorWord;
use cogsync_timing::Timer;
use std::collections::VecDeque;
use std::time::Duration;

/// Participant input the controller understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// Two-valued answer: `true` when the participant says word and ink agree.
    Classify(bool),
    /// Abort request or the presentation surface going away.
    Cancel,
    Other,
}

/// Presentation surface and input source of a session.
pub trait Presenter {
    fn show_message(&mut self, text: &str);
    fn show_countdown(&mut self, label: &str, remaining: Duration);
    fn show_stimulus(&mut self, stimulus: &ColorWord, round: u32, trial: u32);
    fn clear(&mut self);
    /// Waits at most `timeout` for one input event.
    fn poll_input(&mut self, timeout: Duration) -> Option<InputEvent>;
}

/// What a scripted participant answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedAnswer {
    Correct,
    Incorrect,
    /// Correct on the first stimulus, then alternating.
    Alternate,
}

/// Something a presenter was asked to show.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Message(String),
    Countdown { label: String, secs: u64 },
    Stimulus { word: String, color: String, round: u32, trial: u32 },
    Clear,
}

/// Headless participant driven by a shared timer.
///
/// Waiting advances the timer instead of sleeping, so whole sessions run in
/// microseconds against a `ManualTimer`. Every stimulus is answered after the
/// configured reaction time.
pub struct ScriptedPresenter<T: Timer> {
    timer: T,
    answer: ScriptedAnswer,
    reaction_time: Duration,
    cancel_after_stimuli: Option<usize>,
    silent_after_stimuli: Option<usize>,
    cancel_at_ns: Option<u64>,
    queued: VecDeque<InputEvent>,
    pending: Option<ColorWord>,
    stimuli: usize,
    frames: Vec<Frame>,
}

impl<T: Timer> ScriptedPresenter<T> {
    pub fn new(timer: T) -> Self {
        Self {
            timer,
            answer: ScriptedAnswer::Correct,
            reaction_time: Duration::from_millis(450),
            cancel_after_stimuli: None,
            silent_after_stimuli: None,
            cancel_at_ns: None,
            queued: VecDeque::new(),
            pending: None,
            stimuli: 0,
            frames: Vec::new(),
        }
    }

    pub fn answering(mut self, answer: ScriptedAnswer) -> Self {
        self.answer = answer;
        self
    }

    pub fn reaction_time(mut self, rt: Duration) -> Self {
        self.reaction_time = rt;
        self
    }

    /// Cancels instead of answering the stimulus after the first `n`.
    pub fn cancel_after_stimuli(mut self, n: usize) -> Self {
        self.cancel_after_stimuli = Some(n);
        self
    }

    /// Stops answering after the first `n` stimuli.
    pub fn silent_after_stimuli(mut self, n: usize) -> Self {
        self.silent_after_stimuli = Some(n);
        self
    }

    /// Cancels once the timer reaches `at`.
    pub fn cancel_at(mut self, at: Duration) -> Self {
        self.cancel_at_ns = Some(at.as_nanos() as u64);
        self
    }

    /// Input delivered ahead of any scripted answer.
    pub fn queue(&mut self, event: InputEvent) {
        self.queued.push_back(event);
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn stimuli_shown(&self) -> usize {
        self.stimuli
    }

    fn response_for(&self, stimulus: &ColorWord) -> bool {
        let correct = match self.answer {
            ScriptedAnswer::Correct => true,
            ScriptedAnswer::Incorrect => false,
            ScriptedAnswer::Alternate => self.stimuli % 2 == 1,
        };
        if correct {
            stimulus.is_match
        } else {
            !stimulus.is_match
        }
    }
}

impl<T: Timer> Presenter for ScriptedPresenter<T> {
    fn show_message(&mut self, text: &str) {
        self.frames.push(Frame::Message(text.to_string()));
    }

    fn show_countdown(&mut self, label: &str, remaining: Duration) {
        self.frames.push(Frame::Countdown {
            label: label.to_string(),
            secs: remaining.as_secs(),
        });
    }

    fn show_stimulus(&mut self, stimulus: &ColorWord, round: u32, trial: u32) {
        self.stimuli += 1;
        self.pending = Some(stimulus.clone());
        self.frames.push(Frame::Stimulus {
            word: stimulus.word.clone(),
            color: stimulus.color.name.clone(),
            round,
            trial,
        });
    }

    fn clear(&mut self) {
        self.frames.push(Frame::Clear);
    }

    fn poll_input(&mut self, timeout: Duration) -> Option<InputEvent> {
        let now = self.timer.now();
        if self.cancel_at_ns.is_some_and(|at| now >= at) {
            return Some(InputEvent::Cancel);
        }
        if let Some(event) = self.queued.pop_front() {
            return Some(event);
        }
        if self.pending.is_some() {
            if self.cancel_after_stimuli.is_some_and(|n| self.stimuli > n) {
                self.pending = None;
                return Some(InputEvent::Cancel);
            }
            let silent = self.silent_after_stimuli.is_some_and(|n| self.stimuli > n);
            if let Some(stimulus) = self.pending.take_if(|_| !silent) {
                self.timer.sleep(self.reaction_time);
                return Some(InputEvent::Classify(self.response_for(&stimulus)));
            }
        }
        match self.cancel_at_ns {
            Some(at) if at <= now + timeout.as_nanos() as u64 => {
                self.timer.sleep(Duration::from_nanos(at - now));
                Some(InputEvent::Cancel)
            }
            _ => {
                self.timer.sleep(timeout);
                None
            }
        }
    }
}
