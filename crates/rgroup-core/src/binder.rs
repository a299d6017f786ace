//! Controller lookup and creation within a group handle

use tracing::debug;

use crate::error::{ResourceGroupError, Result};
use crate::handle::{Controller, GroupHandle};

/// Return the controller named `controller` from `group`
///
/// Missing controllers are added to the in-memory handle when
/// `create_if_missing` is set, otherwise the lookup fails with
/// `ControllerNotFound`. Nothing is committed to the facility here.
pub fn bind<'h>(
    group: &'h mut GroupHandle<'_>,
    controller: &str,
    create_if_missing: bool,
) -> Result<&'h mut Controller> {
    if let Some(index) = group.position(controller) {
        return Ok(group.controller_at_mut(index));
    }

    if !create_if_missing {
        return Err(ResourceGroupError::ControllerNotFound {
            group: group.name().to_string(),
            controller: controller.to_string(),
        });
    }

    debug!(group = group.name(), controller, "adding controller to handle");
    let group_name = group.name().to_string();
    group
        .add_controller(controller)
        .map_err(|reason| ResourceGroupError::ControllerCreateFailed {
            group: group_name,
            controller: controller.to_string(),
            reason,
        })
}
