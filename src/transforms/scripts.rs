//! Script transforms: optional external transpiler and minification.

use super::{Asset, Transform};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Placeholder in transpiler arguments replaced by the source file path.
pub const FILE_PLACEHOLDER: &str = "{file}";

/// Pipe a script through an external command (e.g. `babel`).
///
/// The source is written to the command's stdin and the transpiled script
/// read from its stdout.
pub struct Transpile {
    program: PathBuf,
    args: Vec<String>,
    cwd: PathBuf,
}

impl Transpile {
    /// Locate `argv[0]` on `PATH`, or relative to the project root.
    pub fn new(argv: &[String], project_root: &Path) -> Result<Self, String> {
        let (name, args) = argv.split_first().ok_or("transpiler command is empty")?;
        let program = which::which_in(name, std::env::var_os("PATH"), project_root)
            .map_err(|e| format!("transpiler '{}' not found: {}", name, e))?;
        Ok(Self { program, args: args.to_vec(), cwd: project_root.to_path_buf() })
    }
}

impl Transform for Transpile {
    fn name(&self) -> &'static str {
        "transpile"
    }

    fn apply(&self, asset: Asset) -> Result<Asset, String> {
        let file = asset.source.to_string_lossy();
        let args: Vec<String> =
            self.args.iter().map(|a| a.replace(FILE_PLACEHOLDER, &file)).collect();

        tracing::debug!("Executing transpiler: {} {:?}", self.program.display(), args);

        let mut child = Command::new(&self.program)
            .args(&args)
            .current_dir(&self.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to execute {}: {}", self.program.display(), e))?;

        // Write stdin on its own thread; the child may fill stdout before reading all input
        let input = asset.contents.clone();
        let writer = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || stdin.write_all(&input))
        });

        let output = child
            .wait_with_output()
            .map_err(|e| format!("failed to wait for {}: {}", self.program.display(), e))?;

        if let Some(writer) = writer {
            match writer.join() {
                Ok(Ok(())) => {}
                // The child may legitimately exit without reading all input
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Ok(Err(e)) => return Err(format!("failed to write to transpiler: {}", e)),
                Err(_) => return Err("transpiler input thread panicked".to_string()),
            }
        }

        if !output.status.success() {
            return Err(format!(
                "transpiler exited with code {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let js = String::from_utf8(output.stdout)
            .map_err(|e| format!("transpiler output is not UTF-8: {}", e))?;
        Ok(asset.with_text(js, "js"))
    }
}

/// Minify JavaScript with `minifier`.
pub struct Minify;

impl Transform for Minify {
    fn name(&self) -> &'static str {
        "minify"
    }

    fn apply(&self, asset: Asset) -> Result<Asset, String> {
        let js = minifier::js::minify(asset.text()?).to_string();
        Ok(asset.with_text(js, "js"))
    }
}
