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

/// Returns `Err(Error::Invariant)` from the enclosing function when the
/// condition does not hold.
///
/// ```ignore
/// invariant!(level < max_levels, "level {} is out of range", level);
/// ```
#[macro_export]
macro_rules! invariant {
    ($condition:expr, $($arg:tt)*) => {
        if !$condition {
            return Err($crate::Error::Invariant(format!($($arg)*)));
        }
    };
}

/// Returns `Err(Error::Corruption)` from the enclosing function when the
/// condition does not hold.
#[macro_export]
macro_rules! corruption_if_not {
    ($condition:expr, $($arg:tt)*) => {
        if !$condition {
            return Err($crate::Error::Corruption(format!($($arg)*)));
        }
    };
}
