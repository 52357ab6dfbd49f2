// ProcessRunner Service
// Launches and stops the FFmpeg process that pushes a group's stream

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;

use crate::models::{redact_rtmp_url, ActiveStreamHandle};
use crate::services::{StreamError, StreamResult};

/// Operating-system process control used by the runner
pub trait ProcessControl: Send + Sync {
    /// Start `program` detached and return its pid. When the process exits,
    /// `pid_file` is removed if it still records this pid.
    fn spawn(&self, program: &str, args: &[String], pid_file: &Path) -> io::Result<u32>;

    /// Forcefully terminate a pid
    fn kill(&self, pid: u32) -> io::Result<()>;

    /// Forcefully terminate every process with this executable name
    fn kill_by_name(&self, name: &str) -> io::Result<()>;

    /// Whether a pid still refers to a live process
    fn is_alive(&self, pid: u32) -> bool;
}

/// Real process control backed by tokio and POSIX signals
pub struct SystemProcessControl;

impl ProcessControl for SystemProcessControl {
    fn spawn(&self, program: &str, args: &[String], pid_file: &Path) -> io::Result<u32> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        let pid = child
            .id()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "process exited before pid was read"))?;

        // Reap in the background so the caller never waits on the transcoder
        let pid_file = pid_file.to_path_buf();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => log::info!("Transcoder {pid} exited with {status}"),
                Err(e) => log::warn!("Failed to wait for transcoder {pid}: {e}"),
            }
            // The pid may be reused; never leave it around to be killed later
            release_pid_file(&pid_file, pid).await;
        });

        Ok(pid)
    }

    #[cfg(unix)]
    fn kill(&self, pid: u32) -> io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let pid = i32::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        kill(Pid::from_raw(pid), Signal::SIGKILL).map_err(io::Error::from)
    }

    #[cfg(not(unix))]
    fn kill(&self, pid: u32) -> io::Result<()> {
        let status = std::process::Command::new("taskkill")
            .args(["/F", "/PID", &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::Other, format!("taskkill exited with {status}")))
        }
    }

    fn kill_by_name(&self, name: &str) -> io::Result<()> {
        #[cfg(unix)]
        let status = std::process::Command::new("pkill")
            .args(["-9", "-x", name])
            .status()?;
        #[cfg(not(unix))]
        let status = std::process::Command::new("taskkill")
            .args(["/F", "/IM", &format!("{name}.exe")])
            .status()?;

        // pkill exits 1 when nothing matched
        match status.code() {
            Some(0) | Some(1) => Ok(()),
            _ => Err(io::Error::new(io::ErrorKind::Other, format!("kill by name exited with {status}"))),
        }
    }

    #[cfg(unix)]
    fn is_alive(&self, pid: u32) -> bool {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        match i32::try_from(pid) {
            Ok(pid) => kill(Pid::from_raw(pid), None).is_ok(),
            Err(_) => false,
        }
    }

    #[cfg(not(unix))]
    fn is_alive(&self, _pid: u32) -> bool {
        true
    }
}

/// What a stop request actually did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The recorded pid was signalled
    Killed(u32),
    /// No pid was recorded and the kill-by-name fallback ran
    KilledByName,
    /// No pid was recorded; nothing was signalled
    NothingRecorded,
}

/// Starts and stops one transcoder per group, tracked through a pid file
pub struct StreamProcessRunner {
    work_dir: PathBuf,
    ffmpeg_path: String,
    kill_by_name_fallback: bool,
    control: Arc<dyn ProcessControl>,
}

impl StreamProcessRunner {
    pub fn new(
        work_dir: PathBuf,
        ffmpeg_path: String,
        kill_by_name_fallback: bool,
        control: Arc<dyn ProcessControl>,
    ) -> Self {
        Self {
            work_dir,
            ffmpeg_path,
            kill_by_name_fallback,
            control,
        }
    }

    /// Where the downloaded media for a group is stored
    pub fn media_path(&self, group_id: i64) -> PathBuf {
        self.work_dir.join(format!("downloaded_video_{group_id}.mp4"))
    }

    /// Where the transcoder pid for a group is recorded
    pub fn pid_path(&self, group_id: i64) -> PathBuf {
        self.work_dir.join(format!("ffmpeg_{group_id}.pid"))
    }

    /// FFmpeg arguments: real-time read, copy video, AAC audio, FLV to the RTMP endpoint
    pub fn build_args(file_path: &Path, rtmp_url: &str) -> Vec<String> {
        vec![
            "-re".to_string(),
            "-i".to_string(), file_path.to_string_lossy().to_string(),
            "-c:v".to_string(), "copy".to_string(),
            "-c:a".to_string(), "aac".to_string(),
            "-f".to_string(), "flv".to_string(),
            rtmp_url.to_string(),
        ]
    }

    /// Launch the transcoder and record its pid. Returns without waiting for it.
    pub async fn start_stream(
        &self,
        file_path: &Path,
        rtmp_url: &str,
        group_id: i64,
    ) -> StreamResult<ActiveStreamHandle> {
        let args = Self::build_args(file_path, rtmp_url);
        log::info!(
            "Starting stream for group {group_id}: {} {} -> {}",
            self.ffmpeg_path,
            file_path.display(),
            redact_rtmp_url(rtmp_url)
        );

        let pid_path = self.pid_path(group_id);
        let pid = self
            .control
            .spawn(&self.ffmpeg_path, &args, &pid_path)
            .map_err(|e| StreamError::Process(e.to_string()))?;

        if let Err(e) = tokio::fs::write(&pid_path, pid.to_string()).await {
            // An unrecorded transcoder could never be stopped by pid
            let _ = self.control.kill(pid);
            return Err(StreamError::Process(format!("Failed to record pid: {e}")));
        }

        // Exited before the pid was written, so the reaper found nothing to clear
        if !self.control.is_alive(pid) {
            release_pid_file(&pid_path, pid).await;
        }

        log::info!("Stream for group {group_id} running as pid {pid}");
        Ok(ActiveStreamHandle {
            group_id,
            process_id: pid,
        })
    }

    /// Read the recorded transcoder for a group, if any
    pub async fn read_handle(&self, group_id: i64) -> Option<ActiveStreamHandle> {
        let content = tokio::fs::read_to_string(self.pid_path(group_id)).await.ok()?;
        match content.trim().parse::<u32>() {
            Ok(process_id) => Some(ActiveStreamHandle {
                group_id,
                process_id,
            }),
            Err(e) => {
                log::warn!("Ignoring corrupt pid file for group {group_id}: {e}");
                None
            }
        }
    }

    /// Whether the group's recorded transcoder is still running
    pub async fn is_running(&self, group_id: i64) -> bool {
        match self.read_handle(group_id).await {
            Some(handle) => self.control.is_alive(handle.process_id),
            None => false,
        }
    }

    /// Kill the group's transcoder and clean up its files. Best effort; never fails.
    pub async fn stop_stream(&self, group_id: i64) -> StopOutcome {
        let outcome = match self.read_handle(group_id).await {
            Some(handle) => {
                if let Err(e) = self.control.kill(handle.process_id) {
                    log::warn!("Failed to kill transcoder {} for group {group_id}: {e}", handle.process_id);
                }
                StopOutcome::Killed(handle.process_id)
            }
            None if self.kill_by_name_fallback => {
                let name = self.executable_name();
                log::warn!("No pid recorded for group {group_id}; killing every '{name}' process");
                if let Err(e) = self.control.kill_by_name(&name) {
                    log::warn!("Kill by name failed: {e}");
                }
                StopOutcome::KilledByName
            }
            None => {
                log::info!("No transcoder recorded for group {group_id}");
                StopOutcome::NothingRecorded
            }
        };

        remove_if_exists(&self.pid_path(group_id)).await;
        self.remove_media(group_id).await;
        outcome
    }

    /// Delete the group's downloaded media, if present
    pub async fn remove_media(&self, group_id: i64) {
        remove_if_exists(&self.media_path(group_id)).await;
    }

    fn executable_name(&self) -> String {
        Path::new(&self.ffmpeg_path)
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "ffmpeg".to_string())
    }
}

/// Remove a pid file only if it still names `pid`
pub(crate) async fn release_pid_file(path: &Path, pid: u32) {
    match tokio::fs::read_to_string(path).await {
        Ok(content) if content.trim() == pid.to_string() => remove_if_exists(path).await,
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to read {}: {e}", path.display()),
    }
}

async fn remove_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => log::debug!("Removed {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove {}: {e}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingControl {
        spawned: Mutex<Vec<(String, Vec<String>)>>,
        killed: Mutex<Vec<u32>>,
        fail_spawn: bool,
        killed_by_name: Mutex<Vec<String>>,
    }

    impl ProcessControl for RecordingControl {
        fn spawn(&self, program: &str, args: &[String], _pid_file: &Path) -> io::Result<u32> {
            if self.fail_spawn {
                return Err(io::Error::new(io::ErrorKind::NotFound, "ffmpeg not found"));
            }
            self.spawned.lock().unwrap().push((program.to_string(), args.to_vec()));
            Ok(4242)
        }

        fn kill(&self, pid: u32) -> io::Result<()> {
            self.killed.lock().unwrap().push(pid);
            Ok(())
        }

        fn kill_by_name(&self, name: &str) -> io::Result<()> {
            self.killed_by_name.lock().unwrap().push(name.to_string());
            Ok(())
        }

        fn is_alive(&self, pid: u32) -> bool {
            !self.killed.lock().unwrap().contains(&pid)
        }
    }

    fn runner(dir: &Path, fallback: bool) -> (StreamProcessRunner, Arc<RecordingControl>) {
        let control = Arc::new(RecordingControl::default());
        let runner = StreamProcessRunner::new(
            dir.to_path_buf(),
            "/usr/bin/ffmpeg".to_string(),
            fallback,
            control.clone(),
        );
        (runner, control)
    }

    #[test]
    fn test_build_args() {
        let args = StreamProcessRunner::build_args(Path::new("/tmp/v.mp4"), "rtmp://h/app/key");
        assert_eq!(
            args,
            ["-re", "-i", "/tmp/v.mp4", "-c:v", "copy", "-c:a", "aac", "-f", "flv", "rtmp://h/app/key"]
        );
    }

    #[test]
    fn test_paths_are_keyed_by_group() {
        let (runner, _) = runner(Path::new("/work"), false);
        assert_eq!(runner.media_path(-1005), PathBuf::from("/work/downloaded_video_-1005.mp4"));
        assert_eq!(runner.pid_path(-1005), PathBuf::from("/work/ffmpeg_-1005.pid"));
    }

    #[tokio::test]
    async fn test_start_records_pid_and_stop_kills_it() {
        let temp = tempfile::tempdir().unwrap();
        let (runner, control) = runner(temp.path(), false);
        let media = runner.media_path(-1);
        tokio::fs::write(&media, b"video").await.unwrap();

        let handle = runner.start_stream(&media, "rtmp://h/app/key", -1).await.unwrap();
        assert_eq!(handle.process_id, 4242);
        assert_eq!(control.spawned.lock().unwrap()[0].0, "/usr/bin/ffmpeg");
        assert_eq!(runner.read_handle(-1).await, Some(handle));
        assert!(runner.is_running(-1).await);

        assert_eq!(runner.stop_stream(-1).await, StopOutcome::Killed(4242));
        assert_eq!(*control.killed.lock().unwrap(), vec![4242]);
        assert!(!runner.pid_path(-1).exists());
        assert!(!media.exists());
        assert!(!runner.is_running(-1).await);
    }

    #[tokio::test]
    async fn test_stop_without_pid_is_a_noop_by_default() {
        let temp = tempfile::tempdir().unwrap();
        let (runner, control) = runner(temp.path(), false);

        assert_eq!(runner.stop_stream(-1).await, StopOutcome::NothingRecorded);
        assert_eq!(runner.stop_stream(-1).await, StopOutcome::NothingRecorded);
        assert!(control.killed.lock().unwrap().is_empty());
        assert!(control.killed_by_name.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_without_pid_uses_fallback_when_enabled() {
        let temp = tempfile::tempdir().unwrap();
        let (runner, control) = runner(temp.path(), true);

        assert_eq!(runner.stop_stream(-1).await, StopOutcome::KilledByName);
        assert_eq!(*control.killed_by_name.lock().unwrap(), vec!["ffmpeg".to_string()]);
    }

    #[tokio::test]
    async fn test_corrupt_pid_file_is_ignored() {
        let temp = tempfile::tempdir().unwrap();
        let (runner, control) = runner(temp.path(), false);
        tokio::fs::write(runner.pid_path(-1), "not-a-pid").await.unwrap();

        assert_eq!(runner.read_handle(-1).await, None);
        assert_eq!(runner.stop_stream(-1).await, StopOutcome::NothingRecorded);
        assert!(control.killed.lock().unwrap().is_empty());
        assert!(!runner.pid_path(-1).exists());
    }

    #[tokio::test]
    async fn test_spawn_failure_records_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let control = Arc::new(RecordingControl {
            fail_spawn: true,
            ..Default::default()
        });
        let runner = StreamProcessRunner::new(temp.path().to_path_buf(), "ffmpeg".to_string(), false, control);

        let err = runner
            .start_stream(Path::new("/tmp/v.mp4"), "rtmp://h/app/key", -1)
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::Process(ref m) if m.contains("ffmpeg not found")));
        assert!(!runner.pid_path(-1).exists());
    }

    #[tokio::test]
    async fn test_unwritable_pid_file_kills_the_transcoder() {
        let temp = tempfile::tempdir().unwrap();
        let missing = temp.path().join("gone");
        let (runner, control) = runner(&missing, false);

        let err = runner
            .start_stream(Path::new("/tmp/v.mp4"), "rtmp://h/app/key", -1)
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::Process(ref m) if m.contains("Failed to record pid")));
        assert_eq!(*control.killed.lock().unwrap(), vec![4242]);
    }

    #[tokio::test]
    async fn test_release_pid_file_only_removes_own_pid() {
        let temp = tempfile::tempdir().unwrap();
        let pid_file = temp.path().join("ffmpeg_-1.pid");

        tokio::fs::write(&pid_file, "4243").await.unwrap();
        release_pid_file(&pid_file, 4242).await;
        assert!(pid_file.exists());

        release_pid_file(&pid_file, 4243).await;
        assert!(!pid_file.exists());

        // Already gone is fine
        release_pid_file(&pid_file, 4243).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exited_transcoder_clears_its_pid_file() {
        let temp = tempfile::tempdir().unwrap();
        let pid_file = temp.path().join("ffmpeg_-1.pid");
        let control = SystemProcessControl;

        let pid = control.spawn("sleep", &["0.3".to_string()], &pid_file).unwrap();
        tokio::fs::write(&pid_file, pid.to_string()).await.unwrap();

        for _ in 0..100 {
            if !pid_file.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(!pid_file.exists());
    }
}
