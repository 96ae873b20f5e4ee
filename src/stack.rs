use crate::audit::Audit;
use crate::compress::Compress;
use crate::config::AppInfo;
use crate::pool::CodecPools;
use crate::recover::Recover;
use std::sync::Arc;

/// The middlewares every service gets, outermost first.
pub type DefaultStack<H> = Audit<Compress<Recover<H>>>;

/// Wraps `handler` in audit logging, compression and panic recovery.
///
/// Recovery sits inside compression so a rendered panic response is
/// compressed like any other, and the audit line sees the final status.
pub fn default_stack<H>(app: AppInfo, handler: H, pools: Arc<CodecPools>) -> DefaultStack<H> {
    Audit::new(app, Compress::with_pools(Recover::new(handler), pools))
}
