//! Line-oriented eval with interactive buffering
//!
//! In interactive mode a line that does not compile on its own (the start of
//! a block, for example) is buffered, and following lines are appended until
//! an empty line or `None` flushes the buffer. Non-interactive mode executes
//! every line directly, so blocks must be complete.

use tether_sdk::{ForeignRuntime, StateHandle};

use crate::error::BridgeResult;

/// Result of feeding one line to `eval`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalOutcome {
    /// The line (or the buffered block) was executed
    Executed,
    /// The line was buffered, waiting for the rest of the block
    Buffered,
    /// Nothing to do: an empty line in non-interactive mode
    Skipped,
}

const LINE_SEP: &str = "\n";

/// Pending lines of an incomplete block
#[derive(Debug, Default)]
pub(crate) struct EvalBuffer {
    lines: Option<String>,
}

impl EvalBuffer {
    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.lines.is_none()
    }

    pub(crate) fn clear(&mut self) {
        self.lines = None;
    }

    /// Feed one line. Any error discards the buffer.
    pub(crate) fn feed(
        &mut self,
        runtime: &dyn ForeignRuntime,
        state: StateHandle,
        interactive: bool,
        line: Option<&str>,
    ) -> BridgeResult<EvalOutcome> {
        let result = self.feed_inner(runtime, state, interactive, line);
        if result.is_err() {
            self.clear();
        }
        result
    }

    /// Execute whatever is buffered, whether or not it compiles
    pub(crate) fn flush(
        &mut self,
        runtime: &dyn ForeignRuntime,
        state: StateHandle,
    ) -> BridgeResult<()> {
        if let Some(lines) = self.lines.take() {
            runtime.execute(state, &lines)?;
        }
        Ok(())
    }

    fn feed_inner(
        &mut self,
        runtime: &dyn ForeignRuntime,
        state: StateHandle,
        interactive: bool,
        line: Option<&str>,
    ) -> BridgeResult<EvalOutcome> {
        let line = line.map(|l| l.replace('\r', ""));

        let line = match line {
            Some(l) if !l.trim().is_empty() => l,
            _ => {
                if !interactive {
                    return Ok(EvalOutcome::Skipped);
                }
                self.flush(runtime, state)?;
                return Ok(EvalOutcome::Executed);
            }
        };

        if !interactive {
            runtime.execute(state, &line)?;
            return Ok(EvalOutcome::Executed);
        }

        if self.lines.is_none() && !runtime.compile(state, &line, None)?.is_none() {
            runtime.execute(state, &line)?;
            return Ok(EvalOutcome::Executed);
        }

        match self.lines.as_mut() {
            Some(lines) => {
                lines.push_str(LINE_SEP);
                lines.push_str(&line);
            }
            None => self.lines = Some(line),
        }
        Ok(EvalOutcome::Buffered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_sdk::recording::tags;
    use tether_sdk::{ForeignError, RecordingRuntime};

    fn setup() -> (RecordingRuntime, StateHandle) {
        let rt = RecordingRuntime::new();
        let state = rt.init(None, false, true).unwrap();
        (rt, state)
    }

    #[test]
    fn test_non_interactive_executes_directly() {
        let (rt, state) = setup();
        let mut buffer = EvalBuffer::default();

        assert_eq!(
            buffer.feed(&rt, state, false, Some("if x:")).unwrap(),
            EvalOutcome::Executed
        );
        assert_eq!(
            buffer.feed(&rt, state, false, None).unwrap(),
            EvalOutcome::Skipped
        );
        assert_eq!(rt.statements(state), vec!["if x:".to_string()]);
    }

    #[test]
    fn test_interactive_buffers_blocks() {
        let (rt, state) = setup();
        let mut buffer = EvalBuffer::default();

        assert_eq!(
            buffer.feed(&rt, state, true, Some("if x:\r")).unwrap(),
            EvalOutcome::Buffered
        );
        assert_eq!(
            buffer.feed(&rt, state, true, Some("    y = 1")).unwrap(),
            EvalOutcome::Buffered
        );
        assert!(rt.statements(state).is_empty());

        assert_eq!(
            buffer.feed(&rt, state, true, None).unwrap(),
            EvalOutcome::Executed
        );
        assert_eq!(rt.statements(state), vec!["if x:\n    y = 1".to_string()]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_interactive_complete_line_runs_now() {
        let (rt, state) = setup();
        let mut buffer = EvalBuffer::default();

        assert_eq!(
            buffer.feed(&rt, state, true, Some("z = 3")).unwrap(),
            EvalOutcome::Executed
        );
        assert_eq!(rt.global(state, "z"), Some(tether_sdk::ForeignValue::Int(3)));
    }

    #[test]
    fn test_error_discards_buffer() {
        let (rt, state) = setup();
        let mut buffer = EvalBuffer::default();
        rt.fail_statement("boom", ForeignError::typed("bad", tags::RUNTIME_ERROR));

        buffer.feed(&rt, state, true, Some("for i in x:")).unwrap();
        assert!(buffer.feed(&rt, state, true, Some("    boom()")).is_ok());
        assert!(buffer.feed(&rt, state, true, None).is_err());
        assert!(buffer.is_empty());
    }
}
