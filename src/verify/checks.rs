//! The ordered verification checklist.
//!
//! Every group runs regardless of earlier failures. Later groups may mention
//! earlier findings in their detail text.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::VerifyConfig;
use crate::snapshot::{
    sha256_file, Category, Manifest, ManifestError, MANIFEST_FILE, PATCH_FILE,
    RESTORE_INSTRUCTIONS_FILE,
};
use crate::util::fs::{count_files_with_extensions, dir_size, human_size};

use super::report::{CheckGroup, VerificationReport};

/// Relative to the snapshot root
pub const ENV_FILE: &str = "config/.env";

const MARKUP_EXTENSIONS: &[&str] = &["html", "htm"];
const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs"];
const STYLE_EXTENSIONS: &[&str] = &["css"];

/// Inputs shared by every group
pub(crate) struct CheckContext<'a> {
    pub root: &'a Path,
    pub config: &'a VerifyConfig,
    pub detailed: bool,
    pub manifest: Result<Manifest, ManifestError>,
}

impl<'a> CheckContext<'a> {
    pub fn new(root: &'a Path, config: &'a VerifyConfig, detailed: bool) -> Self {
        Self {
            root,
            config,
            detailed,
            manifest: Manifest::read(root),
        }
    }

    fn category_dir(&self, category: Category) -> PathBuf {
        self.root.join(category.dir_name())
    }
}

pub(crate) fn run_all(ctx: &CheckContext<'_>, report: &mut VerificationReport) {
    structural_presence(ctx, report);
    manifest_integrity(ctx, report);
    configuration_completeness(ctx, report);
    code_completeness(ctx, report);
    ui_assets_completeness(ctx, report);
    integrity(ctx, report);
}

/// Group 1: every required path exists
fn structural_presence(ctx: &CheckContext<'_>, report: &mut VerificationReport) {
    let group = CheckGroup::Structure;
    let required: [(String, bool); 5] = [
        (MANIFEST_FILE.to_string(), false),
        (RESTORE_INSTRUCTIONS_FILE.to_string(), false),
        (format!("{}/", Category::Config.dir_name()), true),
        (format!("{}/", Category::Code.dir_name()), true),
        (format!("{}/", Category::Webui.dir_name()), true),
    ];
    for (rel, is_dir) in required {
        let path = ctx.root.join(rel.trim_end_matches('/'));
        let present = if is_dir { path.is_dir() } else { path.is_file() };
        let name = format!("{rel} present");
        if present {
            report.pass(group, name, None);
        } else {
            report.fail(group, name, "required path is missing");
        }
    }
}

/// Group 2: manifest parses and the category set matches its flags
fn manifest_integrity(ctx: &CheckContext<'_>, report: &mut VerificationReport) {
    let group = CheckGroup::Manifest;
    match &ctx.manifest {
        Ok(manifest) => {
            report.pass(
                group,
                "Manifest parses",
                Some(format!(
                    "label {}, created {}, revision {}",
                    manifest.label,
                    manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    manifest.git_revision
                )),
            );

            let missing: Vec<&str> = manifest
                .expected_categories()
                .into_iter()
                .filter(|c| !ctx.category_dir(*c).is_dir())
                .map(|c| c.dir_name())
                .collect();
            if missing.is_empty() {
                report.pass(group, "Category directories", None);
            } else {
                report.fail(
                    group,
                    "Category directories",
                    format!("manifest flags imply missing: {}", missing.join(", ")),
                );
            }
        }
        Err(ManifestError::Missing(_)) => {
            report.fail(
                group,
                "Manifest parses",
                format!("{MANIFEST_FILE} is missing (see structural presence)"),
            );
        }
        Err(e) => report.fail(group, "Manifest parses", e.to_string()),
    }

    if ctx.root.join(RESTORE_INSTRUCTIONS_FILE).is_file() {
        report.pass(group, "Restore instructions", None);
    } else {
        report.warn(
            group,
            "Restore instructions",
            format!("{RESTORE_INSTRUCTIONS_FILE} is missing; it can be regenerated"),
        );
    }
}

/// Group 3: environment file and dependency declarations
fn configuration_completeness(ctx: &CheckContext<'_>, report: &mut VerificationReport) {
    let group = CheckGroup::Configuration;
    let env = ctx.root.join(ENV_FILE);
    match fs::read_to_string(&env) {
        Ok(contents) => {
            let lines = contents.lines().filter(|l| !l.trim().is_empty()).count();
            if lines < ctx.config.min_env_lines {
                report.warn(
                    group,
                    "Environment config",
                    format!(
                        "only {lines} lines (expected at least {})",
                        ctx.config.min_env_lines
                    ),
                );
            } else {
                report.pass(group, "Environment config", Some(format!("{lines} lines")));
            }
        }
        Err(_) if env.exists() => {
            report.fail(group, "Environment config", format!("{ENV_FILE} is unreadable"));
        }
        Err(_) => report.fail(group, "Environment config", format!("{ENV_FILE} is missing")),
    }

    let found = dependency_files(&ctx.category_dir(Category::Config));
    if found.is_empty() {
        report.warn(
            group,
            "Dependency files",
            "no requirements*.txt or package*.json found",
        );
    } else {
        report.pass(group, "Dependency files", Some(found.join(", ")));
    }
}

fn dependency_files(config_dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(config_dir) else {
        return Vec::new();
    };
    let mut found: Vec<String> = entries
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| {
            (name.starts_with("requirements") && name.ends_with(".txt"))
                || (name.starts_with("package") && name.ends_with(".json"))
        })
        .collect();
    found.sort();
    found
}

/// Group 4: source, prompt/text and extension-point content under `code/`
fn code_completeness(ctx: &CheckContext<'_>, report: &mut VerificationReport) {
    let group = CheckGroup::Code;
    let code = ctx.category_dir(Category::Code);

    let sources = count_files_with_extensions(&code, &ctx.config.source_extensions);
    if sources == 0 {
        let detail = if code.is_dir() {
            "code/ contains no source files".to_string()
        } else {
            "code/ is missing (see structural presence)".to_string()
        };
        report.fail(group, "Source files", detail);
    } else {
        report.pass(group, "Source files", Some(format!("{sources} files")));
    }

    let texts = count_files_with_extensions(&code, &ctx.config.text_extensions);
    if texts == 0 {
        report.warn(group, "Prompt/text files", "no prompt or text files found");
    } else {
        report.pass(group, "Prompt/text files", Some(format!("{texts} files")));
    }

    let extension_dir = code.join(&ctx.config.extension_dir);
    let label = format!("code/{}", ctx.config.extension_dir.display());
    if extension_dir.is_dir() {
        report.pass(group, "Extension directory", Some(label));
    } else {
        report.warn(group, "Extension directory", format!("{label} is missing"));
    }
}

/// Group 5: markup, script and style counts under `webui/`
fn ui_assets_completeness(ctx: &CheckContext<'_>, report: &mut VerificationReport) {
    let group = CheckGroup::UiAssets;
    let webui = ctx.category_dir(Category::Webui);
    for (name, extensions) in [
        ("Markup files", MARKUP_EXTENSIONS),
        ("Script files", SCRIPT_EXTENSIONS),
        ("Style files", STYLE_EXTENSIONS),
    ] {
        let extensions: Vec<String> = extensions.iter().map(|e| e.to_string()).collect();
        let count = count_files_with_extensions(&webui, &extensions);
        if count == 0 {
            report.warn(
                group,
                name,
                format!("no .{} files under webui/", extensions.join("/.")),
            );
        } else {
            report.pass(group, name, Some(format!("{count} files")));
        }
    }
}

/// Group 6: size is measurable; detailed mode adds per-file checks
fn integrity(ctx: &CheckContext<'_>, report: &mut VerificationReport) {
    let group = CheckGroup::Integrity;
    match dir_size(ctx.root) {
        Ok(size) => report.pass(group, "Snapshot size", Some(human_size(size))),
        Err(e) => {
            report.fail(group, "Snapshot size", format!("snapshot is not readable: {e}"));
            return;
        }
    }

    if !ctx.detailed {
        return;
    }

    let mut empty = Vec::new();
    let mut large = Vec::new();
    for entry in WalkDir::new(ctx.root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        let rel = relative(ctx.root, entry.path());
        if meta.len() == 0 && !is_generated_metadata(&rel) {
            empty.push(rel);
        } else if meta.len() > ctx.config.large_file_bytes {
            large.push(format!("{rel} ({})", human_size(meta.len())));
        }
    }

    if empty.is_empty() {
        report.pass(group, "Zero-byte files", None);
    } else {
        report.warn(
            group,
            "Zero-byte files",
            format!("{} empty: {}", empty.len(), preview(&empty)),
        );
    }

    if large.is_empty() {
        report.pass(group, "Large files", None);
    } else {
        report.warn(
            group,
            "Large files",
            format!(
                "{} over {}: {}",
                large.len(),
                human_size(ctx.config.large_file_bytes),
                preview(&large)
            ),
        );
    }

    if let Ok(manifest) = &ctx.manifest {
        checksums(ctx, manifest, report);
    }
}

fn checksums(ctx: &CheckContext<'_>, manifest: &Manifest, report: &mut VerificationReport) {
    let group = CheckGroup::Integrity;
    if manifest.checksums.is_empty() {
        report.pass(group, "Checksums", Some("none recorded".to_string()));
        return;
    }
    let mut mismatched = Vec::new();
    for (rel, expected) in &manifest.checksums {
        match sha256_file(&ctx.root.join(rel)) {
            Ok(actual) if &actual == expected => {}
            Ok(_) => mismatched.push(format!("{rel} (changed)")),
            Err(_) => mismatched.push(format!("{rel} (missing)")),
        }
    }
    if mismatched.is_empty() {
        report.pass(
            group,
            "Checksums",
            Some(format!("{} files match", manifest.checksums.len())),
        );
    } else {
        report.warn(group, "Checksums", preview(&mismatched));
    }
}

/// Empty descriptor and patch files are normal output of the builder
fn is_generated_metadata(rel: &str) -> bool {
    rel == PATCH_FILE || rel.starts_with("docker/")
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn preview(items: &[String]) -> String {
    const SHOWN: usize = 5;
    let mut text = items.iter().take(SHOWN).cloned().collect::<Vec<_>>().join(", ");
    if items.len() > SHOWN {
        text.push_str(&format!(", and {} more", items.len() - SHOWN));
    }
    text
}
