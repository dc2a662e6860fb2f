use crate::ast::Config;
use crate::dumper::{Style, dump_config, dump_includes};
use std::fs;
use std::io;
use std::path::Path;

/// Writes `config` back to its [`Config::file_path`], creating missing
/// parent directories.
///
/// With `write_includes`, every file resolved through `include` is written
/// to its own path as well.
pub fn write_config(config: &Config, style: &Style, write_includes: bool) -> io::Result<()> {
    if write_includes {
        for (path, content) in dump_includes(config, style) {
            write_file(&path, &content)?;
        }
    }

    if config.file_path().as_os_str().is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "config has no file path",
        ));
    }
    write_file(config.file_path(), &dump_config(config, style))
}

fn write_file(path: &Path, content: &str) -> io::Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir)?;
    }
    log::debug!("writing {}", path.display());
    fs::write(path, content)
}
