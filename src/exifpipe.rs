use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::error::ExifPipeError;
use crate::options::ExifPipeOptions;
use crate::proc::Supervisor;
use crate::read::ReadTask;
use crate::resolve::locate_executable;
use crate::tz::TzResolver;
use crate::value::TagRecord;
use crate::write::{WriteRequest, WriteTask};

/// High-level entry point: one persistent worker process plus the
/// typed read/write task layer.
///
/// Methods take `&self`; concurrent callers are serialized onto the
/// worker by the supervisor and replies come back in submission order.
/// Replacing a dead instance (and any pooling across several of them)
/// is the caller's job: once [`ExifPipe::is_ended`] reports true, every
/// further command fails.
pub struct ExifPipe {
    options: ExifPipeOptions,
    tz_resolver: Option<Box<dyn TzResolver + Send + Sync>>,
    supervisor: Supervisor,
}

impl ExifPipe {
    /// Launches `exiftool` found on `PATH`.
    pub fn new() -> Result<Self, ExifPipeError> {
        let executable = locate_executable("exiftool").ok_or_else(|| {
            ExifPipeError::ExecutableNotFound(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no runnable exiftool on PATH",
            ))
        })?;
        Self::with_executable(&executable)
    }

    /// Launches the worker from a specific path.
    pub fn with_executable(executable: &Path) -> Result<Self, ExifPipeError> {
        Self::with_options(executable, ExifPipeOptions::default())
    }

    pub fn with_options(
        executable: &Path,
        options: ExifPipeOptions,
    ) -> Result<Self, ExifPipeError> {
        Ok(Self {
            options,
            tz_resolver: None,
            supervisor: Supervisor::spawn(executable)?,
        })
    }

    #[cfg(test)]
    pub(crate) fn from_supervisor(supervisor: Supervisor, options: ExifPipeOptions) -> Self {
        Self {
            options,
            tz_resolver: None,
            supervisor,
        }
    }

    /// Installs the coordinate-to-zone lookup used by the timezone
    /// cascade. Without one, GPS-derived zones are skipped.
    pub fn tz_resolver(mut self, resolver: impl TzResolver + Send + Sync + 'static) -> Self {
        self.tz_resolver = Some(Box::new(resolver));
        self
    }

    fn resolver(&self) -> Option<&dyn TzResolver> {
        self.tz_resolver.as_deref().map(|r| r as &dyn TzResolver)
    }

    // --- Reading ---

    /// Reads one file into a typed [`TagRecord`].
    ///
    /// Whatever could be decoded is in the record; what could not is
    /// enumerated in its `errors`/`warnings`. Only protocol-level
    /// problems (worker gone, reply for the wrong file, bad JSON)
    /// surface as `Err`.
    pub fn read_file(&self, path: &Path) -> Result<TagRecord, ExifPipeError> {
        let task = ReadTask::new(path, &self.options, self.resolver());
        let reply = self.supervisor.call(&task.args())?.wait()?;
        let (text, warnings) = reply.into_text()?;
        task.decode(&text, warnings)
    }

    /// Reads several files by pipelining one command per file through
    /// the worker's queue; all commands are submitted before the first
    /// reply is awaited.
    pub fn read_files(&self, paths: &[PathBuf]) -> Result<Vec<TagRecord>, ExifPipeError> {
        let submitted: Vec<_> = paths
            .iter()
            .map(|path| {
                let task = ReadTask::new(path, &self.options, self.resolver());
                let pending = self.supervisor.call(&task.args())?;
                Ok((path, pending))
            })
            .collect::<Result<_, ExifPipeError>>()?;

        let mut records = Vec::with_capacity(submitted.len());
        for (path, pending) in submitted {
            let (text, warnings) = pending.wait()?.into_text()?;
            let task = ReadTask::new(path, &self.options, self.resolver());
            records.push(task.decode(&text, warnings)?);
        }
        Ok(records)
    }

    /// Reads specific tags and deserializes them into `T`.
    ///
    /// Tags without values are missing from the JSON, so optional
    /// fields belong in `T`.
    pub fn read_tags<T: DeserializeOwned>(
        &self,
        path: &Path,
        tags: &[&str],
    ) -> Result<T, ExifPipeError> {
        let mut args: Vec<String> = vec!["-json".to_string()];
        args.extend(tags.iter().map(|t| format!("-{t}")));
        args.push(path.to_string_lossy().into_owned());

        let (text, _warnings) = self.supervisor.call(&args)?.wait()?.into_text()?;
        let parsed: Value = serde_json::from_str(&text)?;
        let element = match parsed {
            Value::Array(mut items) if !items.is_empty() => items.remove(0),
            _ => {
                return Err(ExifPipeError::UnexpectedFormat {
                    path: path.to_string_lossy().into_owned(),
                    command_args: args.join(" "),
                })
            }
        };
        serde_path_to_error::deserialize(element).map_err(ExifPipeError::from)
    }

    /// Reads a binary tag (ThumbnailImage, PreviewImage, ...) as raw
    /// bytes.
    pub fn read_tag_binary(&self, path: &Path, tag: &str) -> Result<Vec<u8>, ExifPipeError> {
        let args = [
            "-b".to_string(),
            format!("-{tag}"),
            path.to_string_lossy().into_owned(),
        ];
        let reply = self.supervisor.call(&args)?.wait()?;
        if reply.output.is_empty() {
            return Err(ExifPipeError::TagNotFound {
                path: path.to_path_buf(),
                tag: tag.to_string(),
            });
        }
        Ok(reply.output)
    }

    // --- Writing ---

    /// Applies one tag-update request. All-or-nothing: an `Err` means
    /// no confirmed mutation.
    pub fn write_file(&self, request: &WriteRequest) -> Result<(), ExifPipeError> {
        let task = WriteTask::new(request);
        let reply = self.supervisor.call(&task.args())?.wait()?;
        let (text, warnings) = reply.into_text()?;
        task.decode(&text, &warnings)
    }

    /// Writes raw bytes to a binary-capable tag through a temp file and
    /// the worker's `-Tag<=file` operator.
    pub fn write_tag_binary<D: AsRef<[u8]>>(
        &self,
        path: &Path,
        tag: &str,
        data: D,
        extra_args: &[&str],
    ) -> Result<(), ExifPipeError> {
        let mut temp_file = NamedTempFile::new()?;
        temp_file.write_all(data.as_ref())?;
        temp_file.flush()?;

        let mut request = WriteRequest::new(path).arg(&format!(
            "-{tag}<={}",
            temp_file.path().to_string_lossy()
        ));
        for arg in extra_args {
            request = request.arg(arg);
        }
        // temp_file lives until after the reply is decoded.
        self.write_file(&request)
    }

    // --- Escape hatches ---

    /// Runs one raw command and returns the worker's reply bytes.
    pub fn execute(&self, args: &[&str]) -> Result<Vec<u8>, ExifPipeError> {
        Ok(self.supervisor.call(args)?.wait()?.output)
    }

    /// Runs one raw command and returns the reply as lines.
    pub fn execute_lines(&self, args: &[&str]) -> Result<Vec<String>, ExifPipeError> {
        let (text, _warnings) = self.supervisor.call(args)?.wait()?.into_text()?;
        Ok(text.lines().map(String::from).collect())
    }

    /// Asks the worker to stop and closes its input. In-flight
    /// commands still resolve.
    pub fn close(&self) -> Result<(), ExifPipeError> {
        self.supervisor.close()
    }

    /// True once the worker has exited; the instance should be
    /// replaced.
    pub fn is_ended(&self) -> bool {
        self.supervisor.is_ended()
    }
}

impl Drop for ExifPipe {
    /// Graceful stop first; the kill is the backstop for a worker that
    /// ignores it.
    fn drop(&mut self) {
        let _ = self.supervisor.close();
        self.supervisor.kill();
    }
}
