//! Scrub `prevent_destroy` from resource lifecycles

use ::hcl::{Body, Expression, Structure};

use crate::errors::{BrokerError, Result};
use crate::workspace::Workspace;

const RESOURCE: &str = "resource";
const LIFECYCLE: &str = "lifecycle";
const PREVENT_DESTROY: &str = "prevent_destroy";

impl Workspace {
    /// Set every `lifecycle { prevent_destroy }` in the workspace HCL to `false`
    pub fn remove_prevent_destroy(&mut self) -> Result<()> {
        for (index, module) in self.modules.iter_mut().enumerate() {
            module.definition = remove_prevent_destroy(&module.definition).map_err(|e| {
                BrokerError::HclParse(format!(
                    "HCL parse error for module {} definition: {}",
                    index, e
                ))
            })?;

            for (name, definition) in module.definitions.iter_mut() {
                *definition = remove_prevent_destroy(definition).map_err(|e| {
                    BrokerError::HclParse(format!(
                        "HCL parse error for module {} definition {:?}: {}",
                        index, name, e
                    ))
                })?;
            }
        }
        Ok(())
    }
}

/// Rewrite one HCL text. Text without an enabled `prevent_destroy` is returned unchanged.
pub fn remove_prevent_destroy(input: &str) -> std::result::Result<String, String> {
    let mut body = ::hcl::parse(input).map_err(|e| e.to_string())?;

    if !scrub_resources(&mut body) {
        return Ok(input.to_string());
    }
    ::hcl::format::to_string(&body).map_err(|e| e.to_string())
}

fn scrub_resources(body: &mut Body) -> bool {
    let mut changed = false;

    for structure in body.0.iter_mut() {
        let Structure::Block(resource) = structure else {
            continue;
        };
        if resource.identifier() != RESOURCE {
            continue;
        }

        let lifecycle = resource.body.0.iter_mut().find_map(|inner| match inner {
            Structure::Block(block) if block.identifier() == LIFECYCLE => Some(block),
            _ => None,
        });
        let Some(lifecycle) = lifecycle else {
            continue;
        };

        for inner in lifecycle.body.0.iter_mut() {
            if let Structure::Attribute(attribute) = inner {
                if attribute.key() == PREVENT_DESTROY && attribute.expr != Expression::Bool(false) {
                    attribute.expr = Expression::Bool(false);
                    changed = true;
                }
            }
        }
    }

    changed
}
