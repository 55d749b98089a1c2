use core::fmt;

use crate::element::Props;
use crate::error::HostError;

/// Adapter between the reconciler and a concrete host tree.
///
/// The reconciler only creates instances during render; every mutation of
/// the attached tree happens during commit.
pub trait HostConfig: 'static {
    /// Handle to a host node.
    type Instance: Clone + PartialEq + fmt::Debug + 'static;

    /// Creates a detached element instance.
    fn create_instance(&self, tag: &str, props: &Props) -> Self::Instance;

    /// Creates a detached text instance.
    fn create_text_instance(&self, text: &str) -> Self::Instance;

    /// Appends `child` as the last child of `parent`, moving it if attached.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when either node is unknown.
    fn append_child(&self, parent: &Self::Instance, child: &Self::Instance) -> Result<(), HostError>;

    /// Inserts `child` before `before`, moving it if attached.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when `before` is not a child of `parent`.
    fn insert_before(
        &self,
        parent: &Self::Instance,
        child: &Self::Instance,
        before: &Self::Instance,
    ) -> Result<(), HostError>;

    /// Detaches `child` from `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when `child` is not a child of `parent`.
    fn remove_child(&self, parent: &Self::Instance, child: &Self::Instance) -> Result<(), HostError>;

    /// Replaces the content of a text instance.
    fn set_text_content(&self, instance: &Self::Instance, text: &str);

    /// Applies changed props to an element instance.
    fn apply_props(&self, instance: &Self::Instance, old: &Props, new: &Props);

    /// Hides or shows an instance without detaching it.
    fn set_visibility(&self, instance: &Self::Instance, hidden: bool);

    /// Runs `task` after the current synchronous work, before any scheduler task.
    fn schedule_microtask(&self, task: Box<dyn FnOnce()>);
}
