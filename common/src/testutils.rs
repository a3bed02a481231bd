/// Creates a source tree inside a fresh temporary directory:
///
/// ```text
/// library
/// |- a.epub
/// |- b.pdf
/// |- c.txt
/// |- fiction
///    |- d.epub
///    |- f.EPUB
///    |- notes.md
///    |- scifi
///       |- e.pdf
/// ```
pub fn setup_library() -> anyhow::Result<tempfile::TempDir> {
    let tmp_dir = tempfile::tempdir()?;
    let library = tmp_dir.path().join("library");
    std::fs::create_dir(&library)?;
    std::fs::write(library.join("a.epub"), "a")?;
    std::fs::write(library.join("b.pdf"), "bb")?;
    std::fs::write(library.join("c.txt"), "ccc")?;
    let fiction = library.join("fiction");
    std::fs::create_dir(&fiction)?;
    std::fs::write(fiction.join("d.epub"), "dddd")?;
    std::fs::write(fiction.join("f.EPUB"), "ffffff")?;
    std::fs::write(fiction.join("notes.md"), "notes")?;
    let scifi = fiction.join("scifi");
    std::fs::create_dir(&scifi)?;
    std::fs::write(scifi.join("e.pdf"), "eeeee")?;
    Ok(tmp_dir)
}

/// Names of the entries directly inside `dir`, sorted.
pub fn list_dir(dir: &std::path::Path) -> anyhow::Result<Vec<String>> {
    let mut names = std::fs::read_dir(dir)?
        .map(|entry| Ok(entry?.file_name().to_string_lossy().into_owned()))
        .collect::<anyhow::Result<Vec<_>>>()?;
    names.sort();
    Ok(names)
}

/// Creates a directory under `root` whose path is 4000 bytes long, so that joining a long file
/// name to it exceeds `PATH_MAX` and any lookup fails with `ENAMETOOLONG`, even for root.
pub fn deep_dir(root: &std::path::Path) -> anyhow::Result<std::path::PathBuf> {
    const TARGET_LEN: usize = 4000;
    let mut dir = root.to_owned();
    while dir.as_os_str().len() + 1 + 200 <= TARGET_LEN {
        dir.push("d".repeat(200));
    }
    let rest = TARGET_LEN - dir.as_os_str().len() - 1;
    if rest > 0 {
        dir.push("d".repeat(rest));
    }
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
