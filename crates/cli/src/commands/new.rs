use dlc_core::{Case, CaseError, CaseRepository, CaseStore};
use dlc_storage::normalize_device_path;

use crate::commands::{fail, print_case};
use crate::{report_error, OutputFormat};

/// Identity fields supplied on the command line.
pub(crate) struct NewCase {
    pub hostname: Option<String>,
    pub device: Option<String>,
    pub resource_id: Option<i64>,
    pub cluster: Option<String>,
}

impl NewCase {
    fn into_case(self) -> Case {
        let mut case = Case::open();
        case.hostname = self.hostname;
        case.device_path = self.device.as_deref().map(normalize_device_path);
        case.resource_id = self.resource_id;
        case.cluster_id = self.cluster;
        case
    }
}

pub(crate) fn cmd_new<S: CaseStore>(
    repo: &CaseRepository<S>,
    identity: NewCase,
    output: OutputFormat,
    quiet: bool,
) {
    let case = identity.into_case();
    match repo.create(&case) {
        Ok(stored) => print_case(&stored, output),
        Err(err @ CaseError::DuplicateActiveCase { .. }) => {
            // Point the operator at the case that already owns the disk.
            let holder = case
                .identity_key()
                .and_then(|key| repo.find_active(&key).ok().flatten());
            match holder {
                Some(existing) => {
                    let msg = format!(
                        "{err}; existing case {} is in {}",
                        existing.case_id.unwrap_or_default(),
                        existing.state
                    );
                    report_error(&msg, output, quiet);
                    std::process::exit(1);
                }
                None => fail(&err, output, quiet),
            }
        }
        Err(err) => fail(&err, output, quiet),
    }
}
