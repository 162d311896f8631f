//! Pre- and post-render scripts.
//!
//! Each script is a shell-style command line. When its first word names a
//! script file with a known extension, the matching interpreter runs it;
//! otherwise the words are executed directly.

use std::path::Path;

use anyhow::{Result, bail};

use super::RenderError;
use crate::log;
use crate::project::ProjectContext;
use crate::utils::exec::{Cmd, EMPTY_FILTER, SILENT_FILTER};

pub const OUTPUT_DIR_ENV: &str = "QUIRE_PROJECT_OUTPUT_DIR";
pub const RENDER_ALL_ENV: &str = "QUIRE_PROJECT_RENDER_ALL";
pub const INPUT_FILES_ENV: &str = "QUIRE_PROJECT_INPUT_FILES";
pub const OUTPUT_FILES_ENV: &str = "QUIRE_PROJECT_OUTPUT_FILES";

/// Run `scripts` in order in the project directory.
///
/// The environment is the session overlay plus `env`. The first failing
/// script aborts the rest.
pub fn run_hooks(
    ctx: &ProjectContext,
    scripts: &[String],
    env: &[(String, String)],
    session_env: &[(String, String)],
    quiet: bool,
) -> Result<()> {
    for script in scripts {
        run_hook(ctx, script, env, session_env, quiet)?;
    }
    Ok(())
}

fn run_hook(
    ctx: &ProjectContext,
    script: &str,
    env: &[(String, String)],
    session_env: &[(String, String)],
    quiet: bool,
) -> Result<()> {
    let words = split_command(script)?;
    if words.is_empty() {
        return Ok(());
    }

    let mut argv = script_handler(&ctx.dir, &words[0]).unwrap_or_default();
    argv.extend(words);

    if !quiet {
        log!("hook"; "`{script}` running");
    }

    let output = Cmd::from_slice(&argv)
        .cwd(&ctx.dir)
        .envs(session_env.iter().chain(env).map(|(k, v)| (k, v)))
        .pty(!quiet)
        .filter(if quiet { &SILENT_FILTER } else { &EMPTY_FILTER })
        .allow_failure(true)
        .run()?;

    if !quiet {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();
        if !stdout.is_empty() {
            println!("{stdout}");
        }
    }

    if !output.status.success() {
        return Err(RenderError::HookFailed {
            script: script.to_owned(),
            code: output.status.code().unwrap_or(-1),
        }
        .into());
    }
    Ok(())
}

/// Interpreter command for a script file, if `first` names one.
fn script_handler(project_dir: &Path, first: &str) -> Option<Vec<String>> {
    let ext = Path::new(first).extension()?.to_str()?;
    if !project_dir.join(first).is_file() {
        return None;
    }
    let handler: &[&str] = match ext {
        "py" => {
            if which::which("python3").is_ok() {
                &["python3"]
            } else {
                &["python"]
            }
        }
        "R" | "r" => &["Rscript"],
        "ts" => &["deno", "run", "--allow-all"],
        "js" => {
            if which::which("node").is_ok() {
                &["node"]
            } else {
                &["deno", "run", "--allow-all"]
            }
        }
        "lua" => &["lua"],
        "sh" => &["sh"],
        _ => return None,
    };
    Some(handler.iter().map(|s| (*s).to_owned()).collect())
}

/// Split a command line into words: whitespace separated, with single and
/// double quotes and backslash escapes. `~` prefixes are expanded.
pub fn split_command(line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => bail!("unterminated quote in `{line}`"),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\' | '$')) => current.push(c),
                            Some(c) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => bail!("unterminated quote in `{line}`"),
                        },
                        Some(c) => current.push(c),
                        None => bail!("unterminated quote in `{line}`"),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(c) = chars.next() {
                    current.push(c);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(expand(&current));
                    current.clear();
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(expand(&current));
    }
    Ok(words)
}

fn expand(word: &str) -> String {
    shellexpand::tilde(word).into_owned()
}

/// Project-relative paths joined by newlines, as exported to hooks.
pub fn files_env_value<'a>(files: impl IntoIterator<Item = &'a Path>) -> String {
    files
        .into_iter()
        .map(crate::utils::path::forward_slashes)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BuildSession;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("echo hi there").unwrap(), vec!["echo", "hi", "there"]);
        assert_eq!(
            split_command(r#"sh -c "echo \"a b\"" 'c d' e\ f"#).unwrap(),
            vec!["sh", "-c", r#"echo "a b""#, "c d", "e f"]
        );
        assert_eq!(split_command("  ").unwrap(), Vec::<String>::new());
        assert_eq!(split_command("''").unwrap(), vec![""]);
        assert!(split_command("echo 'oops").is_err());
    }

    #[test]
    fn test_script_handler() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("prep.sh"), "").unwrap();
        fs::write(dir.path().join("build.R"), "").unwrap();
        assert_eq!(script_handler(dir.path(), "prep.sh"), Some(vec!["sh".to_owned()]));
        assert_eq!(script_handler(dir.path(), "build.R"), Some(vec!["Rscript".to_owned()]));
        // not a file: run as a command
        assert_eq!(script_handler(dir.path(), "missing.py"), None);
        assert_eq!(script_handler(dir.path(), "echo"), None);
    }

    #[test]
    fn test_files_env_value() {
        let files = [Path::new("a.qmd"), Path::new("posts/b.qmd")];
        assert_eq!(files_env_value(files), "a.qmd\nposts/b.qmd");
    }

    #[cfg(unix)]
    #[test]
    fn test_hooks_receive_env_and_fail_with_status() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("hook.sh"),
            "printf '%s' \"$QUIRE_PROJECT_INPUT_FILES|$QUIRE_PROFILE\" > seen.txt\n",
        )
        .unwrap();
        let ctx = ProjectContext::load(dir.path(), &BuildSession::new()).unwrap();
        let env = vec![(INPUT_FILES_ENV.to_owned(), "a.qmd".to_owned())];
        let session_env = vec![("QUIRE_PROFILE".to_owned(), "dev".to_owned())];

        run_hooks(&ctx, &["hook.sh".to_owned()], &env, &session_env, true).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("seen.txt")).unwrap(), "a.qmd|dev");

        let err = run_hooks(&ctx, &["sh -c 'exit 7'".to_owned()], &[], &[], true).unwrap_err();
        assert_eq!(err.to_string(), "sh -c 'exit 7' failed with status 7");
    }
}
