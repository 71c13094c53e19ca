/// Classification for failure policy.
///
/// Used to determine how the aggregation orchestrator should respond to an
/// error raised while refreshing a symbol.
///
/// # Behavior Summary
///
/// | Action | User notice? | Effect |
/// |--------|--------------|--------|
/// | `Ignore` | No | Drop the error, nothing happened |
/// | `Cooldown` | Once | Pause automatic refresh cycles for 60 s |
/// | `Failover` | Only if the retry fails | Remap the symbol and retry on the alternate provider |
/// | `Report` | Yes | Per-symbol notice, previous record kept |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureAction {
    /// Caller-initiated cancellation. Never surfaced to the user and never
    /// counted as a failure anywhere.
    Ignore,

    /// The upstream rate limited us (HTTP 429).
    ///
    /// Automatic refresh cycles are suspended for a fixed window; a single
    /// notice is shown when the window opens. Manual refreshes still run.
    Cooldown,

    /// The credential's tier lacks access to this endpoint or symbol.
    ///
    /// Worth retrying the whole quote+history fetch against the alternate
    /// provider after remapping the symbol. Only meaningful while the
    /// entitlement-restricted provider is active.
    Failover,

    /// Everything else: show a per-symbol notice with a readable message and
    /// keep whatever record was cached before.
    Report,
}
