use std::fmt;

use volley_model::ModuleInfo;

/// A confirmation the operator must give before a module runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    NotOpsecSafe { module: String },
    SingleHostModule { module: String, targets: usize },
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prompt::NotOpsecSafe { module } => write!(
                f,
                "Module '{module}' is not opsec safe, are you sure you want to run it?"
            ),
            Prompt::SingleHostModule { module, targets } => write!(
                f,
                "Module '{module}' is meant for a single host but {targets} targets were given, continue anyway?"
            ),
        }
    }
}

/// Confirmations required by the module's capability flags, in the order they should be asked.
pub fn preflight_prompts(info: &ModuleInfo, target_count: usize) -> Vec<Prompt> {
    let mut prompts = Vec::new();
    if !info.capabilities.opsec_safe {
        prompts.push(Prompt::NotOpsecSafe {
            module: info.name.clone(),
        });
    }
    if !info.capabilities.multiple_hosts && target_count > 1 {
        prompts.push(Prompt::SingleHostModule {
            module: info.name.clone(),
            targets: target_count,
        });
    }
    prompts
}
