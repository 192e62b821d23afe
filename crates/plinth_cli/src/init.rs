//! `plinth init` - scaffold a pipeline configuration or a module.

use std::fs;
use std::path::Path;

use plinth_config::CONFIG_FILE_NAME;
use tracing::info;

use crate::{GlobalArgs, InitArgs};

const PIPELINE_TEMPLATE: &str = r#"[pipeline]
# source_space = "modules"
auto_save = true
ignore_file = ".gitignore"
track_module_source = true

[make]
recurse = true
force = false
"#;

/// Runs the `plinth init` command.
///
/// Without `--module`, writes a `plinth.toml` into `dir`. With `--module
/// NAME`, creates the module directory `dir/NAME` and its description file.
/// Existing files are never overwritten.
pub fn run(args: &InitArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let dir = Path::new(&args.dir);
    fs::create_dir_all(dir)?;

    let created = match &args.module {
        None => {
            let path = dir.join(CONFIG_FILE_NAME);
            if path.exists() {
                return Err(format!("{} already exists", path.display()).into());
            }
            fs::write(&path, PIPELINE_TEMPLATE)?;
            path
        }
        Some(name) => {
            let module_dir = dir.join(name);
            let stem = plinth_common::module_name(&module_dir)
                .ok_or_else(|| format!("invalid module name '{name}'"))?;
            let path = module_dir.join(format!("{stem}.toml"));
            if path.exists() {
                return Err(format!("{} already exists", path.display()).into());
            }
            fs::create_dir_all(&module_dir)?;
            fs::write(&path, module_template(stem, args.root))?;
            path
        }
    };

    info!(path = %created.display(), "initialized");
    if !global.quiet {
        eprintln!("    Created {}", created.display());
    }
    Ok(0)
}

fn module_template(stem: &str, root: bool) -> String {
    let mut out = format!("[{stem}]\n");
    if root {
        out.push_str("root = true\n");
    }
    out.push_str(&format!(
        "\n# [{stem}.targets.output]\n# path = \"output.txt\"\n# command = \"echo {{dir}} > {{out}}\"\n"
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_engine::{Session, SessionOptions};

    fn global() -> GlobalArgs {
        GlobalArgs {
            quiet: true,
            verbose: false,
            config: None,
            source_space: None,
        }
    }

    fn args(dir: &Path, module: Option<&str>, root: bool) -> InitArgs {
        InitArgs {
            dir: dir.display().to_string(),
            module: module.map(String::from),
            root,
        }
    }

    #[test]
    fn pipeline_config_loads() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(run(&args(tmp.path(), None, false), &global()).unwrap(), 0);
        let config = plinth_config::load_config(tmp.path()).unwrap();
        assert!(config.pipeline.auto_save);
        assert!(config.make.recurse);
    }

    #[test]
    fn refuses_to_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        run(&args(tmp.path(), None, false), &global()).unwrap();
        let err = run(&args(tmp.path(), None, false), &global()).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn scaffolded_root_module_resolves() {
        let tmp = tempfile::tempdir().unwrap();
        run(&args(tmp.path(), Some("Base"), true), &global()).unwrap();
        let module_dir = tmp.path().join("Base");
        let content = fs::read_to_string(module_dir.join("Base.toml")).unwrap();
        assert!(content.starts_with("[Base]\nroot = true\n"));

        let mut session = Session::new(SessionOptions::default());
        let id = session.resolve(&module_dir).unwrap();
        assert!(session.module(id).is_root());
        assert!(session.module(id).targets().is_empty());
    }

    #[test]
    fn labelled_module_uses_stem() {
        let tmp = tempfile::tempdir().unwrap();
        run(&args(tmp.path(), Some("Split.v2"), false), &global()).unwrap();
        let content = fs::read_to_string(tmp.path().join("Split.v2").join("Split.toml")).unwrap();
        assert!(content.starts_with("[Split]\n\n"));
        assert!(!content.contains("root"));
    }
}
