//! In-memory display hardware for unit tests
//!
//! Staged changes only land on commit, so tests can observe exactly what a
//! real configuration transaction would have done. Failures are injectable
//! per step.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::{AttachedDisplay, ConfigTransaction, DisplayHardware, DisplayId, OsStatus};

const ILLEGAL_ARGUMENT: OsStatus = 1001;

#[derive(Default)]
struct Inner {
    /// (id, name, enabled) in attach order
    displays: Vec<(DisplayId, String, bool)>,
    pointer: Option<DisplayId>,
    fail_begin: Option<OsStatus>,
    fail_set: HashMap<DisplayId, OsStatus>,
    fail_commit: Option<OsStatus>,
    fail_enumerate: Option<OsStatus>,
    commit_delay: Option<Duration>,
    begins: usize,
    commits: usize,
    cancels: usize,
}

/// Fake [`DisplayHardware`] with injectable failures
#[derive(Default)]
pub struct FakeHardware {
    inner: Mutex<Inner>,
    open: AtomicUsize,
    max_open: AtomicUsize,
}

impl FakeHardware {
    /// Hardware with the given displays attached and enabled
    pub fn with_displays(displays: &[(DisplayId, &str)]) -> Self {
        let hw = Self::default();
        for (id, name) in displays {
            hw.attach(*id, name);
        }
        hw
    }

    pub fn attach(&self, id: DisplayId, name: &str) {
        let mut inner = self.inner.lock();
        inner.displays.retain(|(d, _, _)| *d != id);
        inner.displays.push((id, name.to_string(), true));
    }

    pub fn detach(&self, id: DisplayId) {
        self.inner.lock().displays.retain(|(d, _, _)| *d != id);
    }

    /// Flip hardware state directly, bypassing transactions
    pub fn set_enabled_now(&self, id: DisplayId, enabled: bool) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.displays.iter_mut().find(|(d, _, _)| *d == id) {
            entry.2 = enabled;
        }
    }

    pub fn is_enabled(&self, id: DisplayId) -> Option<bool> {
        let inner = self.inner.lock();
        inner
            .displays
            .iter()
            .find(|(d, _, _)| *d == id)
            .map(|(_, _, enabled)| *enabled)
    }

    pub fn set_pointer(&self, id: Option<DisplayId>) {
        self.inner.lock().pointer = id;
    }

    pub fn fail_begin(&self, code: OsStatus) {
        self.inner.lock().fail_begin = Some(code);
    }

    pub fn fail_set_enabled_for(&self, id: DisplayId, code: OsStatus) {
        self.inner.lock().fail_set.insert(id, code);
    }

    pub fn fail_commit(&self, code: OsStatus) {
        self.inner.lock().fail_commit = Some(code);
    }

    pub fn fail_enumerate(&self, code: OsStatus) {
        self.inner.lock().fail_enumerate = Some(code);
    }

    pub fn set_commit_delay(&self, delay: Duration) {
        self.inner.lock().commit_delay = Some(delay);
    }

    pub fn begins(&self) -> usize {
        self.inner.lock().begins
    }

    pub fn commits(&self) -> usize {
        self.inner.lock().commits
    }

    pub fn cancels(&self) -> usize {
        self.inner.lock().cancels
    }

    /// Highest number of simultaneously open transactions observed
    pub fn max_open_transactions(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }
}

impl DisplayHardware for FakeHardware {
    fn begin_config(&self) -> Result<Box<dyn ConfigTransaction + '_>, OsStatus> {
        {
            let mut inner = self.inner.lock();
            if let Some(code) = inner.fail_begin {
                return Err(code);
            }
            inner.begins += 1;
        }
        let open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(open, Ordering::SeqCst);

        Ok(Box::new(FakeTransaction {
            hw: self,
            staged: Vec::new(),
            closed: false,
        }))
    }

    fn enumerate_attached(&self) -> Result<Vec<AttachedDisplay>, OsStatus> {
        let inner = self.inner.lock();
        if let Some(code) = inner.fail_enumerate {
            return Err(code);
        }
        Ok(inner
            .displays
            .iter()
            .filter(|(_, _, enabled)| *enabled)
            .map(|(id, name, _)| AttachedDisplay {
                id: *id,
                name: name.clone(),
            })
            .collect())
    }

    fn enumerate_all(&self) -> Result<Vec<DisplayId>, OsStatus> {
        let inner = self.inner.lock();
        if let Some(code) = inner.fail_enumerate {
            return Err(code);
        }
        Ok(inner.displays.iter().map(|(id, _, _)| *id).collect())
    }

    fn display_name(&self, id: DisplayId) -> String {
        self.inner
            .lock()
            .displays
            .iter()
            .find(|(d, _, _)| *d == id)
            .map(|(_, name, _)| name.clone())
            .unwrap_or_else(|| format!("Display {}", id))
    }

    fn display_under_pointer(&self) -> Option<DisplayId> {
        self.inner.lock().pointer
    }
}

struct FakeTransaction<'a> {
    hw: &'a FakeHardware,
    staged: Vec<(DisplayId, bool)>,
    closed: bool,
}

impl FakeTransaction<'_> {
    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.hw.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl ConfigTransaction for FakeTransaction<'_> {
    fn set_enabled(&mut self, id: DisplayId, enabled: bool) -> Result<(), OsStatus> {
        let inner = self.hw.inner.lock();
        if let Some(code) = inner.fail_set.get(&id) {
            return Err(*code);
        }
        if !inner.displays.iter().any(|(d, _, _)| *d == id) {
            return Err(ILLEGAL_ARGUMENT);
        }
        self.staged.push((id, enabled));
        Ok(())
    }

    fn commit(&mut self) -> Result<(), OsStatus> {
        let delay = self.hw.inner.lock().commit_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut inner = self.hw.inner.lock();
        if let Some(code) = inner.fail_commit {
            return Err(code);
        }
        for (id, enabled) in self.staged.drain(..) {
            if let Some(entry) = inner.displays.iter_mut().find(|(d, _, _)| *d == id) {
                entry.2 = enabled;
            }
        }
        inner.commits += 1;
        drop(inner);
        self.close();
        Ok(())
    }

    fn cancel(&mut self) {
        self.staged.clear();
        self.hw.inner.lock().cancels += 1;
        self.close();
    }
}

impl Drop for FakeTransaction<'_> {
    fn drop(&mut self) {
        self.close();
    }
}
