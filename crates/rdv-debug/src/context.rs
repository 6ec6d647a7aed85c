use rdv_target::TargetControl;

use crate::channel::EventChannel;
use crate::config::ProbeConfig;

/// Everything a probe run shares: the target, its settings and the channel.
pub struct ProbeContext<'t> {
    pub target: &'t dyn TargetControl,
    pub config: &'t ProbeConfig,
    pub channel: EventChannel<'t>,
}

impl<'t> ProbeContext<'t> {
    #[must_use]
    pub fn new(target: &'t dyn TargetControl, config: &'t ProbeConfig) -> Self {
        Self {
            target,
            config,
            channel: EventChannel::new(target, config.wait_time),
        }
    }
}
