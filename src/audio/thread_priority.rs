// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

/// Default priority for the audio callback thread when KEYCLACK_THREAD_PRIORITY is unset.
const DEFAULT_CALLBACK_THREAD_PRIORITY: u8 = 70;

const PRIORITY_ENV: &str = "KEYCLACK_THREAD_PRIORITY";
const DISABLE_RT_ENV: &str = "KEYCLACK_DISABLE_RT_AUDIO";

/// Scheduling settings for the audio callback thread. Read from the
/// environment once when the stream is built and applied on the first callback,
/// since cpal owns the callback thread.
pub struct CallbackPriority {
    priority: ThreadPriority,
    rt_audio: bool,
    applied: bool,
}

impl CallbackPriority {
    /// Reads KEYCLACK_THREAD_PRIORITY (0-99) and KEYCLACK_DISABLE_RT_AUDIO.
    pub fn from_env() -> CallbackPriority {
        CallbackPriority {
            priority: parse_priority(std::env::var(PRIORITY_ENV).ok().as_deref()),
            rt_audio: !env_flag(DISABLE_RT_ENV),
            applied: false,
        }
    }

    /// Applies the priority to the current thread. Only the first call does anything.
    pub fn apply_once(&mut self) {
        if self.applied {
            return;
        }
        self.applied = true;

        let tp = self.priority;
        if let Err(e) = set_current_thread_priority(tp) {
            warn!(error = ?e, "Failed to raise audio callback thread priority");
        }

        #[cfg(unix)]
        if self.rt_audio {
            use thread_priority::unix::{
                set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
                ThreadSchedulePolicy,
            };
            match set_thread_priority_and_policy(
                thread_native_id(),
                tp,
                ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
            ) {
                Ok(()) => info!("Enabled RT SCHED_FIFO for audio callback thread"),
                Err(e) => warn!(
                    error = %e,
                    "Failed to set RT SCHED_FIFO for audio callback thread"
                ),
            }
        }
    }
}

fn parse_priority(value: Option<&str>) -> ThreadPriority {
    value
        .and_then(|v| v.trim().parse::<u8>().ok())
        .filter(|n| *n < 100)
        .and_then(|n| ThreadPriorityValue::try_from(n).ok())
        .or_else(|| ThreadPriorityValue::try_from(DEFAULT_CALLBACK_THREAD_PRIORITY).ok())
        .map(ThreadPriority::Crossplatform)
        .unwrap_or(ThreadPriority::Max)
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| {
            v == "1"
                || v.eq_ignore_ascii_case("true")
                || v.eq_ignore_ascii_case("yes")
                || v.eq_ignore_ascii_case("on")
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    fn value(n: u8) -> ThreadPriority {
        ThreadPriority::Crossplatform(ThreadPriorityValue::try_from(n).unwrap())
    }

    #[test]
    fn test_parse_priority() {
        assert_eq!(parse_priority(Some("42")), value(42));
        assert_eq!(parse_priority(Some(" 99 ")), value(99));
        assert_eq!(parse_priority(Some("100")), value(70));
        assert_eq!(parse_priority(Some("loud")), value(70));
        assert_eq!(parse_priority(None), value(70));
    }

    #[test]
    #[serial]
    fn test_rt_audio_env_flag() {
        std::env::set_var(DISABLE_RT_ENV, "yes");
        assert!(!CallbackPriority::from_env().rt_audio);

        std::env::set_var(DISABLE_RT_ENV, "0");
        assert!(CallbackPriority::from_env().rt_audio);

        std::env::remove_var(DISABLE_RT_ENV);
        assert!(CallbackPriority::from_env().rt_audio);
    }
}
