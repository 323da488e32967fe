use crate::core::target::ModPlan;
use crate::models::conflict::{ConflictReport, Contributor};
use crate::models::manifest::HostPlatform;
use camino::Utf8PathBuf;
use std::collections::BTreeMap;

/// Every target path mapped to the mods writing it, in load order.
pub type TouchIndex = BTreeMap<Utf8PathBuf, Vec<Contributor>>;

pub struct ConflictDetector;

impl ConflictDetector {
    /// Builds the contributor list of every path touched by `plans` on `host`.
    /// A mod touching the same path twice counts once.
    pub fn index<'a>(plans: impl IntoIterator<Item = &'a ModPlan>, host: HostPlatform) -> TouchIndex {
        let mut index = TouchIndex::new();
        for plan in plans {
            for target in plan.targets(host) {
                let contributors = index.entry(target).or_default();
                if !contributors.iter().any(|c| c.name == plan.name) {
                    contributors.push(Contributor {
                        name: plan.name.clone(),
                        order: plan.order,
                    });
                }
            }
        }
        for contributors in index.values_mut() {
            contributors.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        }
        index
    }

    pub fn detect<'a>(plans: impl IntoIterator<Item = &'a ModPlan>, host: HostPlatform) -> ConflictReport {
        let paths = Self::index(plans, host)
            .into_iter()
            .filter(|(_, c)| c.len() > 1)
            .collect();
        ConflictReport { paths }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::target::PlannedEntry;
    use crate::models::manifest::{FileEntry, Operation, Platform};
    use camino::Utf8Path;

    fn plan(name: &str, order: u32, targets: &[(&str, Platform)]) -> ModPlan {
        ModPlan {
            name: name.into(),
            order,
            entries: targets
                .iter()
                .enumerate()
                .map(|(index, (t, platform))| PlannedEntry {
                    index,
                    entry: FileEntry {
                        source: Some("x".into()),
                        target_subpath: (*t).into(),
                        platform: *platform,
                        operation: Operation::Copy,
                        backup: true,
                    },
                    source: Some("/p/x".into()),
                    target: format!("/t/{t}").into(),
                })
                .collect(),
        }
    }

    #[test]
    fn contributors_follow_load_order() {
        let b = plan("B", 1, &[("file.bundle", Platform::All)]);
        let a = plan("A", 0, &[("file.bundle", Platform::All), ("only-a", Platform::All)]);
        let report = ConflictDetector::detect([&b, &a], HostPlatform::Windows);

        assert_eq!(report.len(), 1);
        assert_eq!(report.winner(Utf8Path::new("/t/file.bundle")).unwrap().name, "B");
    }

    #[test]
    fn platform_excluded_and_repeated_entries_do_not_conflict() {
        let a = plan("A", 0, &[("f", Platform::All), ("f", Platform::All)]);
        let b = plan("B", 1, &[("f", Platform::Mac)]);
        assert!(ConflictDetector::detect([&a, &b], HostPlatform::Windows).is_empty());
        assert_eq!(ConflictDetector::detect([&a, &b], HostPlatform::Mac).len(), 1);
    }
}
