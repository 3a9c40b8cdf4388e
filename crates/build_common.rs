// README-to-rustdoc rendering shared by every crate's build.rs.
// Include with: include!("../build_common.rs");
//
// The including file must import std::env, std::fs and std::path::Path.

/// Render `README.md` into `$OUT_DIR/README_GENERATED.md` for `#![doc]`.
///
/// Source links (`src/pool/manager.rs`, `src/domain/mod.rs`) become module
/// page links (`pool/manager/index.html`, `domain/index.html`), and links to
/// the workspace README point at the repository URL from the root Cargo.toml.
fn process_readme_for_rustdoc(crate_dir: &str) {
    println!("cargo:rerun-if-changed=README.md");
    println!("cargo:rerun-if-changed=../../Cargo.toml");

    let readme = Path::new(crate_dir).join("README.md");
    let content = fs::read_to_string(&readme).unwrap_or_default();

    let mut rendered = rewrite_source_links(&content);
    if let Some(url) = workspace_repository(crate_dir) {
        rendered = rendered.replace("](../../README.md", &format!("]({url}"));
    }

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    fs::write(Path::new(&out_dir).join("README_GENERATED.md"), rendered)
        .expect("OUT_DIR is writable");
}

/// Rewrite every `](src/<path>.rs)` link target to its rustdoc module page.
fn rewrite_source_links(content: &str) -> String {
    const OPEN: &str = "](src/";

    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after = &rest[start + OPEN.len()..];
        let Some(end) = after.find(')') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let target = &after[..end];
        let module = target
            .strip_suffix("/mod.rs")
            .or_else(|| target.strip_suffix(".rs"))
            .unwrap_or(target);
        out.push_str("](");
        out.push_str(module);
        out.push_str("/index.html)");
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// `repository = "..."` from the workspace Cargo.toml, if present.
fn workspace_repository(crate_dir: &str) -> Option<String> {
    let manifest = Path::new(crate_dir).parent()?.parent()?.join("Cargo.toml");
    let content = fs::read_to_string(manifest).ok()?;

    content.lines().map(str::trim).find_map(|line| {
        let value = line.strip_prefix("repository")?.trim_start().strip_prefix('=')?;
        let value = value.trim().strip_prefix('"')?;
        value.split('"').next().map(str::to_string)
    })
}
