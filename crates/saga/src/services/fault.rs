//! Failure injection for the in-memory services.

/// Decides whether the next call to a fake should fail.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct FaultPlan {
    fail_always: bool,
    fail_next: u32,
}

impl FaultPlan {
    pub(crate) fn set_fail_always(&mut self, fail: bool) {
        self.fail_always = fail;
    }

    pub(crate) fn set_fail_next(&mut self, calls: u32) {
        self.fail_next = calls;
    }

    /// Consumes one call and returns true if it must fail.
    pub(crate) fn should_fail(&mut self) -> bool {
        if self.fail_always {
            return true;
        }
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return true;
        }
        false
    }
}
