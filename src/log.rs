#![allow(unused_imports, unused_macros)]
use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(feature = "log")] {
        pub(crate) use log::{debug, error, warn};
    } else {
        // Arguments stay type-checked when `log` is disabled
        macro_rules! log_debug {
            ($($arg:tt)+) => {{ let _ = format_args!($($arg)+); }};
        }
        macro_rules! log_error {
            ($($arg:tt)+) => {{ let _ = format_args!($($arg)+); }};
        }
        macro_rules! log_warn {
            ($($arg:tt)+) => {{ let _ = format_args!($($arg)+); }};
        }

        // `warn` itself clashes with the builtin lint attribute
        pub(crate) use log_debug as debug;
        pub(crate) use log_error as error;
        pub(crate) use log_warn as warn;
    }
}
