use crate::client::models::ui_state::Notice;

/// User-visible toast surface. The messaging core decides when to raise a
/// notice and of which kind; rendering belongs to the front-end.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}
