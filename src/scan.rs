use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;
use zip::ZipArchive;

/// Raw bytes of one class file, labelled with where they came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassInput {
    /// File path, or `jar_path:entry_name` for jar entries.
    pub label: String,
    pub bytes: Vec<u8>,
}

/// Collects class files from a `.class` file, a `.jar`, or a directory tree.
///
/// Directory listings and jar entries are sorted so the output order is
/// stable across runs and platforms.
pub fn scan_inputs(input: &Path) -> Result<Vec<ClassInput>> {
    if !input.exists() {
        anyhow::bail!("input not found: {}", input.display());
    }
    let mut classes = Vec::new();
    scan_path(input, true, &mut classes)?;
    debug!(input = %input.display(), classes = classes.len(), "scan finished");
    Ok(classes)
}

fn scan_path(path: &Path, strict: bool, classes: &mut Vec<ClassInput>) -> Result<()> {
    if path.is_dir() {
        return scan_dir(path, classes);
    }

    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    match extension {
        "class" => scan_class_file(path, classes),
        _ if is_jar_path(path) => scan_jar_file(path, classes),
        _ => {
            if strict {
                anyhow::bail!("unsupported input file: {}", path.display())
            } else {
                Ok(())
            }
        }
    }
}

fn scan_dir(path: &Path, classes: &mut Vec<ClassInput>) -> Result<()> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path)
        .with_context(|| format!("failed to read directory {}", path.display()))?
    {
        let entry =
            entry.with_context(|| format!("failed to read entry under {}", path.display()))?;
        entries.push(entry.path());
    }

    entries.sort_by(|a, b| path_key(a).cmp(&path_key(b)));

    for entry in entries {
        scan_path(&entry, false, classes)?;
    }

    Ok(())
}

fn scan_class_file(path: &Path, classes: &mut Vec<ClassInput>) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    classes.push(ClassInput {
        label: path.display().to_string(),
        bytes,
    });
    Ok(())
}

fn scan_jar_file(path: &Path, classes: &mut Vec<ClassInput>) -> Result<()> {
    let file =
        fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("failed to read {}", path.display()))?;

    let mut entry_names = Vec::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        // Multi-release overlays would list the same class twice.
        if name.ends_with(".class")
            && !name.ends_with("module-info.class")
            && !name.starts_with("META-INF/versions/")
        {
            entry_names.push(name);
        }
    }

    entry_names.sort();

    for name in entry_names {
        let mut entry = archive
            .by_name(&name)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        classes.push(ClassInput {
            label: format!("{}:{}", path.display(), name),
            bytes,
        });
    }

    Ok(())
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn is_jar_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("jar"))
        .unwrap_or(false)
}
