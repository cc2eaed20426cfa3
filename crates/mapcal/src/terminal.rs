//! Line-driven presentation adapter.
//!
//! Every input line is one press of the single action button: the first
//! press on a point captures it, the next one confirms and moves on. A
//! line reading `q` or `quit`, or the end of input, aborts the run. Pose
//! failures are reported and the same point is offered again.

use std::io::{self, BufRead, Write};

use mapcal_core::TransformFit;
use mapcal_session::{CalibrationSession, CapturePrompt, PoseSource, SessionError, Step};

#[derive(thiserror::Error, Debug)]
pub enum TerminalError {
    #[error("calibration aborted before all points were captured")]
    Aborted,
    #[error("calibration session already finished")]
    AlreadyFinished,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Drives a [`CalibrationSession`] from `input`, writing prompts to `output`.
pub struct TerminalAdapter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> TerminalAdapter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_inner(self) -> (R, W) {
        (self.input, self.output)
    }

    /// Run `session` to completion and return the fitted transform.
    pub fn run<P: PoseSource + ?Sized>(
        &mut self,
        session: &mut CalibrationSession,
        poses: &mut P,
    ) -> Result<TransformFit, TerminalError> {
        match session.prompt() {
            Some(prompt) => self.show_prompt(&prompt)?,
            None if session.is_finished() => return Err(TerminalError::AlreadyFinished),
            None => {}
        }

        loop {
            self.wait_for_press()?;
            match session.advance(poses) {
                Ok(Step::AwaitingCapture(prompt)) => self.show_prompt(&prompt)?,
                Ok(Step::Captured(reading)) => {
                    writeln!(self.output, "{reading} Press [Continue].")?;
                }
                Ok(Step::Completed(fit)) => {
                    writeln!(
                        self.output,
                        "Calibration complete! ({:?} fit, rms residual {:.6}, max residual {:.6})",
                        fit.model, fit.rms_residual, fit.max_residual
                    )?;
                    writeln!(self.output, "{}", fit.transform)?;
                    return Ok(fit);
                }
                Ok(Step::Finished) => return Err(TerminalError::AlreadyFinished),
                Err(err) if err.is_retryable() => {
                    writeln!(
                        self.output,
                        "Could not read the robot pose: {err}. Press [Capture] to retry."
                    )?;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn show_prompt(&mut self, prompt: &CapturePrompt) -> io::Result<()> {
        writeln!(
            self.output,
            "[{}/{}] {} (map {:.3}, {:.3})",
            prompt.cursor + 1,
            prompt.total,
            prompt,
            prompt.map.x,
            prompt.map.y
        )?;
        self.output.flush()
    }

    fn wait_for_press(&mut self) -> Result<(), TerminalError> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(TerminalError::Aborted);
        }
        match line.trim() {
            "q" | "quit" => Err(TerminalError::Aborted),
            _ => Ok(()),
        }
    }
}
