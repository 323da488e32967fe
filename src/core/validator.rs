use crate::core::security::SecurityPolicy;
use crate::models::error::{ManifestViolation, ManifestViolations, SError};
use crate::models::manifest::{ModManifest, ModType, Operation, Platform};
use crate::utils::file::FileUtils;
use camino::Utf8Path;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

const VERSION_SHAPE: &str = r"^\d+\.\d+\.\d+$";
const DRIVE_PREFIX: &str = r"^[A-Za-z]:";
const FORBIDDEN_NAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];
const WINDOWS_DEVICE_NAMES: &[&str] = &[
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Checks a raw manifest document and turns it into a typed [`ModManifest`].
/// Every broken rule is collected before failing.
pub struct ManifestValidator {
    version: Regex,
    drive: Regex,
    policy: SecurityPolicy,
}

struct Violations(Vec<ManifestViolation>);

impl Violations {
    fn push(&mut self, field: impl Into<String>, rule: impl Into<String>) {
        self.0.push(ManifestViolation::new(field, rule));
    }
}

impl ManifestValidator {
    pub fn new() -> Result<Self, SError> {
        let compile = |p: &str| Regex::new(p).map_err(|e| SError::ParseError(e.to_string()));
        Ok(Self {
            version: compile(VERSION_SHAPE)?,
            drive: compile(DRIVE_PREFIX)?,
            policy: SecurityPolicy::new()?,
        })
    }

    pub fn read(&self, path: &Utf8Path) -> Result<ModManifest, SError> {
        let text = std::fs::read_to_string(path).map_err(|e| SError::io_failure(path, "read manifest", e))?;
        let raw: Value = serde_json::from_str(&text)?;
        self.validate(&raw)
    }

    pub fn validate(&self, raw: &Value) -> Result<ModManifest, SError> {
        let mut out = Violations(Vec::new());

        let Some(obj) = raw.as_object() else {
            out.push("$", "manifest must be a JSON object");
            return Err(SError::ManifestError(ManifestViolations(out.0)));
        };

        if let Some(name) = self.required_str(obj, "name", &mut out) {
            if let Err(rule) = check_dir_name(name) {
                out.push("name", rule);
            }
        }
        if let Some(version) = self.required_str(obj, "version", &mut out) {
            self.check_version(version, &mut out);
        }
        if let Some(tag) = self.required_str(obj, "type", &mut out) {
            if ModType::parse(tag).is_none() {
                let allowed = ModType::ALL.map(|t| t.to_string()).join(", ");
                out.push("type", format!("'{tag}' is not one of: {allowed}"));
            }
        }
        self.required_str(obj, "author", &mut out);

        for key in ["description", "homepage", "license"] {
            if let Some(v) = obj.get(key) {
                if !v.is_string() && !v.is_null() {
                    out.push(key, "must be a string");
                }
            }
        }
        for key in ["dependencies", "conflicts", "load_after"] {
            if let Some(v) = obj.get(key) {
                let ok = v
                    .as_array()
                    .is_some_and(|items| items.iter().all(Value::is_string));
                if !ok {
                    out.push(key, "must be an array of strings");
                }
            }
        }
        if let Some(v) = obj.get("compatibility") {
            if !v.is_object() {
                out.push("compatibility", "must be an object");
            }
        }

        match obj.get("files") {
            None => out.push("files", "required"),
            Some(Value::Array(files)) if files.is_empty() => out.push("files", "must not be empty"),
            Some(Value::Array(files)) => {
                for (i, file) in files.iter().enumerate() {
                    self.check_entry(i, file, &mut out);
                }
            }
            Some(_) => out.push("files", "must be an array"),
        }

        if !out.0.is_empty() {
            debug!(count = out.0.len(), "manifest rejected");
            return Err(SError::ManifestError(ManifestViolations(out.0)));
        }

        let mut normalized = obj.clone();
        lowercase_tags(&mut normalized);
        serde_json::from_value(Value::Object(normalized))
            .map_err(|e| SError::ManifestError(ManifestViolations(vec![ManifestViolation::new("$", e.to_string())])))
    }

    fn required_str<'a>(&self, obj: &'a Map<String, Value>, key: &str, out: &mut Violations) -> Option<&'a str> {
        match obj.get(key) {
            None | Some(Value::Null) => {
                out.push(key, "required");
                None
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                out.push(key, "must not be empty");
                None
            }
            Some(Value::String(s)) => Some(s),
            Some(_) => {
                out.push(key, "must be a string");
                None
            }
        }
    }

    fn check_version(&self, version: &str, out: &mut Violations) {
        let fits = self.version.is_match(version)
            && version.split('.').all(|part| part.parse::<u64>().is_ok());
        if !fits {
            out.push("version", format!("'{version}' is not MAJOR.MINOR.PATCH"));
        }
    }

    fn check_entry(&self, i: usize, file: &Value, out: &mut Violations) {
        let at = |field: &str| format!("files[{i}].{field}");

        let Some(entry) = file.as_object() else {
            out.push(format!("files[{i}]"), "must be an object");
            return;
        };

        let operation = match entry.get("operation") {
            None => Some(Operation::Copy),
            Some(Value::String(tag)) => {
                let op = Operation::parse(tag);
                if op.is_none() {
                    out.push(at("operation"), format!("'{tag}' is not copy or delete"));
                }
                op
            }
            Some(_) => {
                out.push(at("operation"), "must be a string");
                None
            }
        };

        match entry.get("platform") {
            None => {}
            Some(Value::String(tag)) if Platform::parse(tag).is_some() => {}
            Some(Value::String(tag)) => out.push(at("platform"), format!("'{tag}' is not windows, mac or all")),
            Some(_) => out.push(at("platform"), "must be a string"),
        }

        if let Some(v) = entry.get("backup") {
            if !v.is_boolean() {
                out.push(at("backup"), "must be a boolean");
            }
        }

        match entry.get("target_subpath") {
            Some(Value::String(target)) => {
                if let Err(rule) = self.check_relative(target) {
                    out.push(at("target_subpath"), rule);
                } else if let Some(pattern) = last_segment(target).and_then(|n| self.policy.reserved_pattern(n)) {
                    // reserved names are never an authorized delete either
                    out.push(
                        at("target_subpath"),
                        format!("targets a protected game file (matches '{pattern}')"),
                    );
                }
            }
            Some(_) => out.push(at("target_subpath"), "must be a string"),
            None => out.push(at("target_subpath"), "required"),
        }

        if operation == Some(Operation::Copy) {
            match entry.get("source") {
                Some(Value::String(source)) => {
                    if let Err(rule) = self.check_relative(source) {
                        out.push(at("source"), rule);
                    }
                }
                Some(Value::Null) | None => out.push(at("source"), "required for copy"),
                Some(_) => out.push(at("source"), "must be a string"),
            }
        }
    }

    fn check_relative(&self, path: &str) -> Result<(), String> {
        if path.trim().is_empty() {
            return Err("must not be empty".into());
        }
        if path.starts_with('/') || path.starts_with('\\') {
            return Err("must be relative (leading separator)".into());
        }
        if self.drive.is_match(path) {
            return Err("must be relative (drive letter)".into());
        }
        match FileUtils::normalize_relative(Utf8Path::new(path)) {
            None => Err("must not contain '..'".into()),
            Some(p) if p.as_str().is_empty() => Err("must name a file".into()),
            Some(_) => Ok(()),
        }
    }

    /// Every copy source has to exist in the payload as a regular file.
    pub fn verify_payload(&self, manifest: &ModManifest, payload_root: &Utf8Path) -> Result<(), SError> {
        let missing: Vec<ManifestViolation> = manifest
            .files
            .iter()
            .enumerate()
            .filter(|(_, e)| e.operation == Operation::Copy)
            .filter_map(|(i, e)| {
                let source = e.source.as_deref()?;
                let present = FileUtils::normalize_relative(source)
                    .map(|rel| payload_root.join(rel))
                    .and_then(|p| p.symlink_metadata().ok())
                    .is_some_and(|m| m.is_file());
                (!present).then(|| {
                    ManifestViolation::new(format!("files[{i}].source"), format!("'{source}' is missing from the payload"))
                })
            })
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(SError::ManifestError(ManifestViolations(missing)))
        }
    }
}

fn last_segment(path: &str) -> Option<&str> {
    path.rsplit(['/', '\\']).find(|s| !s.is_empty())
}

/// `name` becomes `mods/<name>/`, so it has to be a portable folder name.
pub fn check_dir_name(name: &str) -> Result<(), String> {
    if name == "." || name == ".." {
        return Err("must not be '.' or '..'".into());
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_NAME_CHARS.contains(c) || c.is_control()) {
        return Err(format!("contains '{}' which is not allowed in a folder name", c.escape_default()));
    }
    if name.ends_with('.') || name.ends_with(' ') || name.starts_with(' ') {
        return Err("must not start with a space or end with a dot or space".into());
    }
    let stem = name.split('.').next().unwrap_or(name).to_lowercase();
    if WINDOWS_DEVICE_NAMES.contains(&stem.as_str()) {
        return Err(format!("'{name}' is a reserved device name"));
    }
    Ok(())
}

/// Tags are matched case-insensitively; serde wants them lowercase.
fn lowercase_tags(obj: &mut Map<String, Value>) {
    if let Some(Value::String(t)) = obj.get_mut("type") {
        *t = t.to_lowercase();
    }
    if let Some(Value::Array(files)) = obj.get_mut("files") {
        for file in files.iter_mut().filter_map(Value::as_object_mut) {
            for key in ["operation", "platform"] {
                if let Some(Value::String(t)) = file.get_mut(key) {
                    *t = t.to_lowercase();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn device_names_are_refused() {
        assert!(check_dir_name("CON").is_err());
        assert!(check_dir_name("aux.txt").is_err());
        assert!(check_dir_name("Console Skin").is_ok());
        assert!(check_dir_name("a/b").is_err());
    }

    #[test]
    fn tags_are_case_insensitive() {
        let v = ManifestValidator::new().unwrap();
        let m = v
            .validate(&json!({
                "name": "x", "version": "1.0.0", "type": "UI", "author": "a",
                "files": [{"source": "a.bundle", "target_subpath": "a.bundle", "platform": "Windows"}]
            }))
            .unwrap();
        assert_eq!(m.mod_type, ModType::Ui);
        assert_eq!(m.files[0].platform, Platform::Windows);
    }

    #[test]
    fn non_object_is_rejected() {
        let v = ManifestValidator::new().unwrap();
        assert!(matches!(v.validate(&json!([1, 2])), Err(SError::ManifestError(_))));
    }
}
