//! Post-initialization setup statements
//!
//! Each step is optional and runs as plain statements through the new
//! interpreter, followed by a flush. Steps run in a fixed order: include
//! paths, shared module hook, host import hook, output redirection.

use std::path::PathBuf;

use tether_sdk::HostObject;

use super::{Config, Interpreter};
use crate::error::BridgeResult;
use crate::main_runtime::SharedImporter;
use crate::value::Value;

#[cfg(windows)]
const PATH_SEPARATOR: char = ';';
#[cfg(not(windows))]
const PATH_SEPARATOR: char = ':';

/// Run every configured setup step
pub(super) fn run(interpreter: &Interpreter, config: &Config) -> BridgeResult<()> {
    include_paths(interpreter, &config.include_paths)?;
    shared_modules_hook(interpreter, config)?;
    host_import_hook(interpreter, config)?;
    redirect_output_streams(interpreter, config)?;
    Ok(())
}

/// Quote `paths` as one separator-joined literal for the runtime
pub(crate) fn path_literal(paths: &[PathBuf]) -> String {
    let sep = PATH_SEPARATOR.to_string();
    paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(&sep)
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
}

fn include_paths(interpreter: &Interpreter, paths: &[PathBuf]) -> BridgeResult<()> {
    if paths.is_empty() {
        return Ok(());
    }

    interpreter.exec("import sys")?;
    interpreter.exec(&format!(
        "sys.path += '{}'.split('{}')",
        path_literal(paths),
        PATH_SEPARATOR
    ))?;
    interpreter.flush()
}

fn shared_modules_hook(interpreter: &Interpreter, config: &Config) -> BridgeResult<()> {
    if !config.has_shared_modules() {
        return Ok(());
    }

    let modules: Vec<Value> = config.shared_modules.iter().map(|m| Value::from(m.as_str())).collect();
    let importer = SharedImporter::new(interpreter.main.clone());

    interpreter.set("shared_modules", Value::List(modules))?;
    interpreter.set("shared_importer", HostObject::new(importer))?;
    interpreter.exec("from tether import shared_modules_hook")?;
    interpreter.exec("shared_modules_hook.setup_importer(shared_modules, shared_importer)")?;
    interpreter.exec("del shared_modules")?;
    interpreter.exec("del shared_importer")?;
    interpreter.exec("del shared_modules_hook")?;
    interpreter.flush()
}

fn host_import_hook(interpreter: &Interpreter, config: &Config) -> BridgeResult<()> {
    let Some(enquirer) = &config.name_enquirer else {
        return Ok(());
    };

    interpreter.set("name_enquirer", HostObject::new(enquirer.clone()))?;
    interpreter.exec("from tether import host_import_hook")?;
    interpreter.exec("host_import_hook.setup_importer(name_enquirer)")?;
    interpreter.exec("del name_enquirer")?;
    interpreter.exec("del host_import_hook")?;
    interpreter.flush()
}

fn redirect_output_streams(interpreter: &Interpreter, config: &Config) -> BridgeResult<()> {
    if !config.redirect_output_streams {
        return Ok(());
    }

    let mut sinks = Vec::new();
    if let Some(stdout) = &config.redirect_stdout {
        interpreter.set("redirect_stdout", stdout.clone())?;
        sinks.push("redirect_stdout");
    }
    if let Some(stderr) = &config.redirect_stderr {
        interpreter.set("redirect_stderr", stderr.clone())?;
        sinks.push("redirect_stderr");
    }

    interpreter.exec("from tether import redirect_streams")?;
    interpreter.exec("redirect_streams.setup()")?;
    interpreter.exec("del redirect_streams")?;
    for sink in sinks {
        interpreter.exec(&format!("del {}", sink))?;
    }
    interpreter.flush()
}
