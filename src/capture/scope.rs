//! Scoped acquisition of OS graphics resources.
//!
//! Each successful acquisition registers its release. When the scope is
//! dropped, on success, early return or panic alike, releases run in
//! reverse acquisition order. A failed acquisition registers nothing, so
//! only what was actually obtained is given back.

use super::CaptureError;

type Release<'a> = Box<dyn FnOnce() + 'a>;

#[derive(Default)]
pub struct ResourceScope<'a> {
    releases: Vec<(&'static str, Release<'a>)>,
}

impl<'a> ResourceScope<'a> {
    pub fn new() -> Self {
        Self {
            releases: Vec::new(),
        }
    }

    /// Runs `acquire`; on `Some(handle)` registers `release(handle)` and
    /// returns the handle, on `None` fails with a resource error naming
    /// `step`.
    pub fn acquire<T, A, R>(
        &mut self,
        step: &'static str,
        acquire: A,
        release: R,
    ) -> Result<T, CaptureError>
    where
        T: Copy + 'a,
        A: FnOnce() -> Option<T>,
        R: FnOnce(T) + 'a,
    {
        match acquire() {
            Some(handle) => {
                self.releases.push((step, Box::new(move || release(handle))));
                Ok(handle)
            }
            None => {
                log::warn!("[CAPTURE] Resource acquisition failed at '{}'", step);
                Err(CaptureError::ResourceFailure {
                    step,
                    detail: format!("{} returned no handle", step),
                })
            }
        }
    }

    /// Registers a release for something obtained outside `acquire`.
    pub fn defer<R>(&mut self, step: &'static str, release: R)
    where
        R: FnOnce() + 'a,
    {
        self.releases.push((step, Box::new(release)));
    }

    /// Turns a failed non-acquiring step (a copy, a read-back) into a
    /// resource error. Already registered releases still run on drop.
    pub fn check(&self, step: &'static str, ok: bool) -> Result<(), CaptureError> {
        if ok {
            Ok(())
        } else {
            log::warn!("[CAPTURE] Step '{}' failed", step);
            Err(CaptureError::ResourceFailure {
                step,
                detail: format!("{} reported failure", step),
            })
        }
    }

    /// Number of releases still pending.
    pub fn held(&self) -> usize {
        self.releases.len()
    }
}

impl Drop for ResourceScope<'_> {
    fn drop(&mut self) {
        while let Some((step, release)) = self.releases.pop() {
            log::trace!("[CAPTURE] Releasing '{}'", step);
            release();
        }
    }
}
