//! OS inspection helpers.
//!
//! Small wrappers over `/proc` and a handful of syscalls: processor
//! counts, thread identifiers, process liveness, the boot identifier,
//! and thread naming. They are Linux-backed; the name-publishing side is
//! best effort and harmless where `/proc` does not exist.

use spindle_core::{Error, Result};
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::OnceLock;

/// The value a thread or process id takes when it designates nothing.
pub const PID_UNDEFINED: i32 = -1;

/// Longest thread name the kernel accepts, in bytes.
pub const THREAD_NAME_MAX: usize = 15;

/// The thread identifier of the calling thread.
///
/// Under Linux threads are tasks; each one has its own `pid_t`, distinct
/// from the process id.
pub fn gettid() -> i32 {
    unsafe { libc::syscall(libc::SYS_gettid) as i32 }
}

/// Total number of processors configured on this system.
///
/// Includes processors the OS is not currently using; for sizing a pool,
/// [`available_processors`] is usually the right call.
pub fn total_processors() -> usize {
    let count = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_CONF) };
    if count < 1 {
        1
    } else {
        count as usize
    }
}

/// Number of processors currently usable.
///
/// A sensible pool size is this count, or twice it for workloads that
/// spend most of their time in I/O.
pub fn available_processors() -> usize {
    num_cpus::get()
}

/// The largest process identifier the kernel hands out, inclusive.
///
/// Read once from `/proc/sys/kernel/pid_max` and cached; returns -1 when
/// it cannot be determined.
pub fn pid_max() -> i32 {
    static PID_MAX: OnceLock<i32> = OnceLock::new();
    *PID_MAX.get_or_init(|| {
        fs::read_to_string("/proc/sys/kernel/pid_max")
            .ok()
            .and_then(|raw| raw.trim().parse::<i32>().ok())
            .map(|max| max - 1)
            .unwrap_or(-1)
    })
}

/// Thread identifiers of the given process, from `/proc/<pid>/task/`.
///
/// With `None` the calling process is inspected. A process with a single
/// entry runs no extra threads. Unknown processes yield an empty list.
pub fn thread_ids(pid: Option<i32>) -> Vec<i32> {
    let pid = pid.unwrap_or_else(|| unsafe { libc::getpid() });

    let mut results: Vec<i32> = match fs::read_dir(format!("/proc/{}/task", pid)) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str().and_then(|s| s.parse().ok()))
            .collect(),
        Err(_) => Vec::new(),
    };
    results.sort_unstable();
    results
}

/// Whether the process with `pid` is currently running.
///
/// Checks for `/proc/<pid>`; between the check and the use of the answer
/// the process may of course exit, or the pid be recycled.
pub fn is_process_running(pid: i32) -> bool {
    if pid == unsafe { libc::getpid() } {
        return true;
    }
    Path::new(&format!("/proc/{}", pid)).exists()
}

/// The boot identifier generated by the kernel at boot.
///
/// Lets software detect a reboot between two observations. Empty on
/// systems without one.
pub fn boot_id() -> String {
    fs::read_to_string("/proc/sys/kernel/random/boot_id")
        .map(|raw| raw.trim().to_string())
        .unwrap_or_default()
}

/// Number of live threads in the calling process, including the caller.
///
/// Derived from the link count of `/proc/self/task`, so the answer can
/// change between two calls.
pub fn thread_count() -> std::io::Result<usize> {
    let task = fs::metadata("/proc/self/task")?;
    Ok(task.nlink().saturating_sub(2) as usize)
}

/// Whether this process runs with the vDSO mapped.
///
/// When it is, `time(2)`-style calls may be answered without entering
/// the kernel and can be up to one second off; prefer
/// `clock_gettime(2)`-backed clocks for deadlines.
pub fn has_vdso() -> bool {
    static VDSO: OnceLock<bool> = OnceLock::new();
    *VDSO.get_or_init(|| unsafe { libc::getauxval(libc::AT_SYSINFO_EHDR) != 0 })
}

/// Truncate `name` to the longest prefix the kernel accepts.
pub fn truncated_thread_name(name: &str) -> &str {
    if name.len() <= THREAD_NAME_MAX {
        return name;
    }
    let mut end = THREAD_NAME_MAX;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Publish `name` as the name of the calling thread.
///
/// The name goes through the thread-naming syscall and the per-task
/// `comm` file, so both in-process queries and process inspectors see
/// it.
pub fn set_current_thread_name(name: &str) -> Result<()> {
    validate_thread_name(name)?;

    let cname = std::ffi::CString::new(name)
        .map_err(|_| Error::invalid("thread name contains a nul byte"))?;
    unsafe {
        libc::prctl(libc::PR_SET_NAME, cname.as_ptr());
    }

    set_thread_name(gettid(), name)
}

/// Write `name` to the `comm` file of thread `tid`.
pub fn set_thread_name(tid: i32, name: &str) -> Result<()> {
    validate_thread_name(name)?;

    fs::write(format!("/proc/{}/comm", tid), name)
        .map_err(|err| Error::System(format!("writing the comm file failed: {}", err)))
}

fn validate_thread_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid("thread name cannot be empty"));
    }
    if name.len() > THREAD_NAME_MAX {
        return Err(Error::invalid(format!(
            "thread name is limited to {} bytes, \"{}\" is too long",
            THREAD_NAME_MAX, name
        )));
    }
    Ok(())
}

/// The published name of the calling thread.
pub fn current_thread_name() -> String {
    thread_name(gettid())
}

/// The published name of thread `tid`, read from its `comm` file.
///
/// Empty when the thread does not exist. Note that this reads what was
/// last published, which may differ from the runner name when the name
/// was changed mid-run.
pub fn thread_name(tid: i32) -> String {
    fs::read_to_string(format!("/proc/{}/comm", tid))
        .map(|raw| raw.trim_end().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gettid_is_stable() {
        let tid = gettid();
        assert!(tid > 0);
        assert_eq!(gettid(), tid);

        // a different thread gets a different id
        let other = std::thread::spawn(gettid).join().unwrap();
        assert_ne!(other, tid);
    }

    #[test]
    fn test_processor_counts() {
        assert!(available_processors() >= 1);
        assert!(total_processors() >= available_processors());
    }

    #[test]
    fn test_pid_max() {
        assert!(pid_max() > 0);
    }

    #[test]
    fn test_thread_ids_contains_self() {
        let ids = thread_ids(None);
        assert!(!ids.is_empty());
        assert!(ids.contains(&unsafe { libc::getpid() }));
    }

    #[test]
    fn test_own_process_is_running() {
        assert!(is_process_running(unsafe { libc::getpid() }));
    }

    #[test]
    fn test_boot_id_has_uuid_shape() {
        let id = boot_id();
        assert!(!id.is_empty());
        assert_eq!(id.split('-').count(), 5);
    }

    #[test]
    fn test_thread_count_counts_the_caller() {
        assert!(thread_count().unwrap() >= 1);
    }

    #[test]
    fn test_truncation() {
        assert_eq!(truncated_thread_name("short"), "short");
        assert_eq!(
            truncated_thread_name("a_very_long_thread_name"),
            "a_very_long_thr"
        );
    }

    #[test]
    fn test_name_validation() {
        assert!(set_current_thread_name("").is_err());
        assert!(set_current_thread_name("a_name_longer_than_the_kernel_takes").is_err());
    }

    #[test]
    fn test_name_round_trip() {
        std::thread::spawn(|| {
            set_current_thread_name("spindle_test").unwrap();
            assert_eq!(current_thread_name(), "spindle_test");
        })
        .join()
        .unwrap();
    }
}
