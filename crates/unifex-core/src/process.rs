//! Process-pool workers: one child process per slot, each opening its own
//! unit from an [`ExtractorSpec`] and serving pages over the
//! [`protocol`](crate::protocol).

use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use crate::dispatch::PageWorker;
use crate::error::{ErrorKind, ExtractError};
use crate::models::PageExtractionResult;
use crate::options::ExtractorSpec;
use crate::protocol::{Request, Response, read_message, write_message};
use crate::unit::ExtractionUnit;

/// Environment variable naming the worker executable.
pub const WORKER_BIN_ENV: &str = "UNIFEX_WORKER_BIN";

/// How to launch a worker process. The worker speaks the protocol on its
/// stdin/stdout; its stderr is inherited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// `$UNIFEX_WORKER_BIN worker`, or `<current executable> worker`.
    pub fn from_env() -> Result<Self, ExtractError> {
        let program = match std::env::var_os(WORKER_BIN_ENV).filter(|v| !v.is_empty()) {
            Some(bin) => PathBuf::from(bin),
            None => std::env::current_exe().map_err(|e| {
                ExtractError::Executor(format!("cannot locate worker executable: {e}"))
            })?,
        };
        Ok(Self::new(program).arg("worker"))
    }
}

/// Parent side of one worker process.
pub(crate) struct ProcessWorker {
    id: usize,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl ProcessWorker {
    fn spawn(id: usize, command: &WorkerCommand, spec: &ExtractorSpec) -> Result<Self, ExtractError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        // Keep workers out of the terminal's process group: Ctrl+C reaches
        // only the parent, which drains in-flight pages via cancellation.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        let mut child = cmd
            .spawn()
            .map_err(|e| {
                ExtractError::Executor(format!(
                    "failed to spawn worker {}: {e}",
                    command.program.display()
                ))
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ExtractError::Executor("worker pipes unavailable".into()));
        };
        let mut worker = Self {
            id,
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
        };
        worker
            .send(&Request::Open { spec: spec.clone() })
            .map_err(|e| ExtractError::Executor(format!("worker {id} rejected open: {e}")))?;
        Ok(worker)
    }

    fn send(&mut self, request: &Request) -> io::Result<()> {
        match self.stdin.as_mut() {
            Some(stdin) => write_message(stdin, request),
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "worker stdin closed")),
        }
    }

    fn receive(&mut self) -> io::Result<Response> {
        read_message(&mut self.stdout)?
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "worker process exited"))
    }

    /// Wait for the worker to finish opening its unit.
    fn await_ready(&mut self, spec: &ExtractorSpec) -> Result<usize, ExtractError> {
        let response = self
            .receive()
            .map_err(|e| ExtractError::Executor(format!("worker {} failed to start: {e}", self.id)))?;
        match response {
            Response::Ready { page_count } => Ok(page_count),
            Response::Fatal {
                kind: ErrorKind::UnsupportedSource,
                message,
            } => Err(ExtractError::UnsupportedSource {
                path: spec.source.clone(),
                reason: message,
            }),
            Response::Fatal { message, .. } => Err(ExtractError::BackendInit(message)),
            Response::Result { .. } => Err(ExtractError::Executor(format!(
                "worker {} answered open with a page result",
                self.id
            ))),
        }
    }
}

impl PageWorker for ProcessWorker {
    fn run(&mut self, index: usize) -> Result<PageExtractionResult, String> {
        self.send(&Request::Page { index }).map_err(|e| e.to_string())?;
        match self.receive().map_err(|e| e.to_string())? {
            Response::Result { result } if result.page == index => Ok(result),
            Response::Result { result } => Err(format!(
                "worker answered page {} while page {index} was pending",
                result.page
            )),
            other => Err(format!("unexpected worker response: {other:?}")),
        }
    }
}

impl Drop for ProcessWorker {
    fn drop(&mut self) {
        // EOF on stdin tells the worker to close its unit and exit.
        drop(self.stdin.take());
        match self.child.wait() {
            Ok(status) if !status.success() => {
                tracing::warn!(worker = self.id, %status, "worker process exited abnormally");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(worker = self.id, error = %e, "failed to reap worker process"),
        }
    }
}

/// Start `count` worker processes and wait until every one has opened its
/// unit. Any failure is job-fatal; workers already started are shut down.
pub(crate) fn spawn_workers<'a, U: ExtractionUnit + ?Sized>(
    unit: &U,
    count: usize,
    command: Option<&WorkerCommand>,
) -> Result<Vec<Box<dyn PageWorker + 'a>>, ExtractError> {
    let spec = unit.spec().ok_or_else(|| {
        ExtractError::Executor(format!(
            "{} cannot be reopened in a worker process",
            unit.source().display()
        ))
    })?;
    let command = match command {
        Some(c) => c.clone(),
        None => WorkerCommand::from_env()?,
    };

    // Spawn all first so the children initialize their backends in parallel.
    let mut started = Vec::with_capacity(count);
    for id in 0..count {
        started.push(ProcessWorker::spawn(id, &command, &spec)?);
    }

    let expected = unit.page_count();
    let mut workers: Vec<Box<dyn PageWorker + 'a>> = Vec::with_capacity(count);
    for mut worker in started.drain(..) {
        let page_count = worker.await_ready(&spec)?;
        if page_count != expected {
            tracing::warn!(
                worker = worker.id,
                page_count,
                expected,
                "worker sees a different page count"
            );
        }
        workers.push(Box::new(worker));
    }
    tracing::debug!(workers = workers.len(), program = %command.program.display(), "worker processes ready");
    Ok(workers)
}

/// Worker-process side of the protocol: open a unit with `open`, then serve
/// page requests until stdin closes.
///
/// Returns an error only for protocol or IO failures; an open failure is
/// reported to the parent as `fatal` and ends the session normally.
pub fn serve<R, W, F>(mut input: R, mut output: W, open: F) -> Result<(), ExtractError>
where
    R: BufRead,
    W: Write,
    F: FnOnce(&ExtractorSpec) -> Result<Box<dyn ExtractionUnit>, ExtractError>,
{
    let spec = match read_message::<_, Request>(&mut input)? {
        Some(Request::Open { spec }) => spec,
        Some(other) => {
            return Err(ExtractError::Executor(format!(
                "expected open request, got {other:?}"
            )));
        }
        None => return Ok(()),
    };

    let unit = match open(&spec) {
        Ok(unit) => unit,
        Err(e) => {
            tracing::debug!(error = %e, "worker failed to open unit");
            write_message(
                &mut output,
                &Response::Fatal {
                    kind: e.kind(),
                    message: e.to_string(),
                },
            )?;
            return Ok(());
        }
    };
    write_message(
        &mut output,
        &Response::Ready {
            page_count: unit.page_count(),
        },
    )?;

    let served = serve_pages(&mut input, &mut output, unit.as_ref());
    let closed = unit.close();
    served?;
    closed
}

fn serve_pages<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    unit: &dyn ExtractionUnit,
) -> Result<(), ExtractError> {
    while let Some(request) = read_message::<_, Request>(input)? {
        match request {
            Request::Page { index } => {
                let result = unit.extract_page(index);
                write_message(output, &Response::Result { result })?;
            }
            Request::Open { .. } => {
                return Err(ExtractError::Executor("worker already opened".into()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractorKind;
    use crate::options::ExtractorOptions;
    use crate::testing::FakeUnit;

    fn requests(msgs: &[Request]) -> io::Cursor<Vec<u8>> {
        let mut buf = Vec::new();
        for m in msgs {
            write_message(&mut buf, m).unwrap();
        }
        io::Cursor::new(buf)
    }

    fn responses(bytes: Vec<u8>) -> Vec<Response> {
        let mut reader = io::Cursor::new(bytes);
        let mut out = Vec::new();
        while let Some(r) = read_message(&mut reader).unwrap() {
            out.push(r);
        }
        out
    }

    fn spec() -> ExtractorSpec {
        ExtractorSpec::new("fake.pdf", ExtractorKind::Pdf, ExtractorOptions::default())
    }

    #[test]
    fn test_serve_answers_each_page() {
        let input = requests(&[
            Request::Open { spec: spec() },
            Request::Page { index: 2 },
            Request::Page { index: 0 },
        ]);
        let unit = FakeUnit::new(3).failing_on(0);
        let releases = unit.release_counter();
        let mut output = Vec::new();
        serve(input, &mut output, |_| Ok(Box::new(unit) as Box<dyn ExtractionUnit>)).unwrap();

        let got = responses(output);
        assert_eq!(got[0], Response::Ready { page_count: 3 });
        match (&got[1], &got[2]) {
            (Response::Result { result: a }, Response::Result { result: b }) => {
                assert_eq!(a.page, 2);
                assert!(a.is_success());
                assert_eq!(b.page, 0);
                assert!(!b.is_success());
            }
            other => panic!("unexpected responses: {other:?}"),
        }
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn test_serve_reports_open_failure_as_fatal() {
        let input = requests(&[Request::Open { spec: spec() }]);
        let mut output = Vec::new();
        serve(input, &mut output, |_| {
            Err(ExtractError::BackendInit("AZURE_DI_KEY is not set".into()))
        })
        .unwrap();
        match &responses(output)[..] {
            [Response::Fatal { kind, message }] => {
                assert_eq!(*kind, ErrorKind::BackendInit);
                assert!(message.contains("AZURE_DI_KEY"));
            }
            other => panic!("unexpected responses: {other:?}"),
        }
    }

    #[test]
    fn test_serve_rejects_page_before_open() {
        let input = requests(&[Request::Page { index: 0 }]);
        let err = serve(input, Vec::new(), |_| {
            Ok(Box::new(FakeUnit::new(1)) as Box<dyn ExtractionUnit>)
        })
        .unwrap_err();
        assert!(matches!(err, ExtractError::Executor(_)));
    }

    #[test]
    fn test_missing_worker_binary_is_executor_error() {
        let unit = FakeUnit::new(4).with_spec(spec());
        let command = WorkerCommand::new("/nonexistent/unifex-worker").arg("worker");
        let err = spawn_workers(&unit, 2, Some(&command)).err().unwrap();
        assert!(matches!(err, ExtractError::Executor(_)), "{err}");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_worker_leads_its_own_process_group() {
        // Answers ready with page_count 1 only when its pgid equals its pid.
        let script = r#"read _
pgid=$(cut -d' ' -f5 /proc/$$/stat)
if [ "$pgid" = "$$" ]; then n=1; else n=0; fi
echo "{\"type\":\"ready\",\"page_count\":$n}"
read _"#;
        let command = WorkerCommand::new("sh").arg("-c").arg(script);
        let mut worker = ProcessWorker::spawn(0, &command, &spec()).unwrap();
        assert_eq!(worker.await_ready(&spec()).unwrap(), 1);
    }

    #[test]
    fn test_unit_without_spec_cannot_use_processes() {
        let unit = FakeUnit::new(4);
        let err = spawn_workers(&unit, 2, None).err().unwrap();
        assert!(matches!(err, ExtractError::Executor(_)));
    }
}
