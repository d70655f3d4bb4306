// Copyright 2019 Fullstop000 <fullstop1005@gmail.com>.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::record::reader::Reporter;
use crate::{Error, Result};
use std::cell::RefCell;
use std::rc::Rc;

/// A `Reporter` remembering the first corruption met by a record reader.
///
/// Cloned handles share the same state so the caller can keep one while the
/// reader owns the other.
#[derive(Clone, Default)]
pub struct LogReporter {
    inner: Rc<RefCell<LogReporterInner>>,
}

#[derive(Default)]
struct LogReporterInner {
    dropped_bytes: u64,
    reason: Option<String>,
}

impl LogReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `Error::Corruption` if any corruption has been reported
    pub fn result(&self) -> Result<()> {
        let inner = self.inner.borrow();
        match &inner.reason {
            None => Ok(()),
            Some(reason) => Err(Error::Corruption(format!(
                "{} ({} bytes dropped)",
                reason, inner.dropped_bytes
            ))),
        }
    }
}

impl Reporter for LogReporter {
    fn corruption(&mut self, bytes: u64, reason: &str) {
        warn!("log record dropped: {} bytes, {}", bytes, reason);
        let mut inner = self.inner.borrow_mut();
        inner.dropped_bytes += bytes;
        if inner.reason.is_none() {
            inner.reason = Some(reason.to_owned());
        }
    }
}
