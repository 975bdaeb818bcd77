//! Operator-controlled alert authorization

/// Whether an over-threshold drift should produce an alert.
///
/// `notify_enabled` comes from the remote `shouldNotify` flag. The tracker
/// only ever reads it; operators flip it out of band to silence alerts while
/// the vehicle is expected to move.
pub fn should_alert(is_drift: bool, notify_enabled: bool) -> bool {
    is_drift && notify_enabled
}
