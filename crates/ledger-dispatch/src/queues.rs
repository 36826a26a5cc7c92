use ledger_core::config::Settings;
use ledger_core::model::Priority;

/// The four logical queue names, resolved from `Settings` rather than
/// hardcoded (spec §4.9, §6: `RQ_HIGH_QUEUE` etc. are configurable).
#[derive(Debug, Clone)]
pub struct Queues {
    pub high: String,
    pub default: String,
    pub low: String,
    pub dead: String,
}

impl Queues {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            high: settings.rq_high_queue.clone(),
            default: settings.rq_default_queue.clone(),
            low: settings.rq_low_queue.clone(),
            dead: settings.rq_dlq.clone(),
        }
    }

    pub fn for_priority(&self, priority: Priority) -> &str {
        match priority {
            Priority::High => &self.high,
            Priority::Default => &self.default,
            Priority::Low => &self.low,
        }
    }

    pub fn priority_for_name(&self, name: &str) -> Option<Priority> {
        if name == self.high {
            Some(Priority::High)
        } else if name == self.default {
            Some(Priority::Default)
        } else if name == self.low {
            Some(Priority::Low)
        } else {
            None
        }
    }
}
