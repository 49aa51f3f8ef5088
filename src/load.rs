use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use jclassfile::class_file;
use tracing::debug;
use zip::ZipArchive;

use crate::classfile::{parse_class, RawClass};
use crate::model::{ClassRecord, Environment, FieldRecord, MethodRecord};
use crate::names::{simple_class_name, NamePolicy};

/// Load one archive into an environment. Accepts a JAR, a bare class file,
/// or a directory of class files; entries are visited in sorted order so the
/// resulting maps are reproducible.
pub(crate) fn load_environment(path: &Path, policy: &NamePolicy) -> Result<Environment> {
    let mut env = Environment::default();
    load_path(path, true, policy, &mut env)?;
    debug!(
        path = %path.display(),
        classes = env.class_count(),
        methods = env.method_count(),
        fields = env.field_count(),
        "environment loaded"
    );
    Ok(env)
}

fn load_path(path: &Path, strict: bool, policy: &NamePolicy, env: &mut Environment) -> Result<()> {
    if path.is_dir() {
        return load_dir(path, policy, env);
    }

    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    match extension {
        "class" => load_class_file(path, policy, env),
        "jar" | "zip" => load_archive(path, policy, env),
        _ => {
            if strict {
                anyhow::bail!("unsupported input file: {}", path.display())
            } else {
                Ok(())
            }
        }
    }
}

fn load_dir(path: &Path, policy: &NamePolicy, env: &mut Environment) -> Result<()> {
    let mut entries = Vec::new();
    for entry in
        fs::read_dir(path).with_context(|| format!("failed to read directory {}", path.display()))?
    {
        let entry =
            entry.with_context(|| format!("failed to read entry under {}", path.display()))?;
        entries.push(entry.path());
    }

    entries.sort();

    for entry in entries {
        if entry.is_dir() {
            load_dir(&entry, policy, env)?;
        } else {
            load_path(&entry, false, policy, env)?;
        }
    }

    Ok(())
}

fn load_class_file(path: &Path, policy: &NamePolicy, env: &mut Environment) -> Result<()> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    install_class_bytes(&data, policy, env)
        .with_context(|| format!("failed to parse {}", path.display()))
}

fn load_archive(path: &Path, policy: &NamePolicy, env: &mut Environment) -> Result<()> {
    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
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
        if name.ends_with(".class") && !name.ends_with("module-info.class") {
            entry_names.push(name);
        }
    }

    entry_names.sort();

    for name in entry_names {
        let mut entry = archive
            .by_name(&name)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        install_class_bytes(&data, policy, env)
            .with_context(|| format!("failed to parse {}:{}", path.display(), name))?;
    }

    Ok(())
}

fn install_class_bytes(data: &[u8], policy: &NamePolicy, env: &mut Environment) -> Result<()> {
    // Full-format validation first; the projection reader only walks the
    // slices matching needs and assumes a well-formed file.
    class_file::parse(data).context("class file rejected by validator")?;
    let raw = parse_class(data)?;
    install_class(raw, policy, env);
    Ok(())
}

fn install_class(raw: RawClass, policy: &NamePolicy, env: &mut Environment) {
    let owner = raw.name.clone();
    let mut class = ClassRecord {
        obfuscated: policy.is_obfuscated(simple_class_name(&raw.name)),
        name: raw.name,
        super_name: raw.super_name,
        interfaces: raw.interfaces,
        access: raw.access,
        methods: Vec::new(),
        fields: Vec::new(),
    };

    for method in raw.methods {
        let record = MethodRecord {
            obfuscated: policy.is_obfuscated(&method.name),
            name: method.name,
            owner: owner.clone(),
            descriptor: method.descriptor,
            access: method.access,
            exceptions: method.exceptions,
            code: method.code,
            constants: method.constants,
        };
        let key = record.full_signature();
        if !class.methods.contains(&key) {
            class.methods.push(key);
        }
        env.insert_method(record);
    }

    for field in raw.fields {
        let record = FieldRecord {
            obfuscated: policy.is_obfuscated(&field.name),
            name: field.name,
            owner: owner.clone(),
            descriptor: field.descriptor,
            access: field.access,
            value: field.value,
        };
        let key = record.full_signature();
        if !class.fields.contains(&key) {
            class.fields.push(key);
        }
        env.insert_field(record);
    }

    env.insert_class(class);
}
