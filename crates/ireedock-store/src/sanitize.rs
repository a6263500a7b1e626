/// Longest name, in bytes, a sanitized file name may have.
pub const MAX_NAME_LEN: usize = 100;

/// Reduce an untrusted file name to a safe, flat name.
///
/// Keeps only ASCII `[A-Za-z0-9._-]`, so separators and traversal sequences
/// cannot survive. Runs of dots collapse to one. A result that is empty or
/// starts with a dot is prefixed with `file_` (leading dots dropped), and
/// the result is capped at [`MAX_NAME_LEN`] bytes. Never fails.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len().min(MAX_NAME_LEN));
    for c in name.chars() {
        if !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')) {
            continue;
        }
        if c == '.' && out.ends_with('.') {
            continue;
        }
        out.push(c);
    }

    if out.is_empty() || out.starts_with('.') {
        out = format!("file_{}", out.trim_start_matches('.'));
    }
    out.truncate(MAX_NAME_LEN);
    out
}

/// Split a name into stem and extension (with its dot). The extension is the
/// part after the last dot, unless that dot starts the name.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

/// Ensure `name` ends with `extension`, trimming the stem so the total stays
/// within [`MAX_NAME_LEN`].
pub fn with_extension(name: &str, extension: &str) -> String {
    if name.ends_with(extension) {
        return name.to_owned();
    }
    let mut keep = MAX_NAME_LEN.saturating_sub(extension.len()).min(name.len());
    while !name.is_char_boundary(keep) {
        keep -= 1;
    }
    format!("{}{extension}", &name[..keep])
}

/// The `n`th candidate name for `name`: the name itself for 0, then
/// `stem_1.ext`, `stem_2.ext`, and so on. The stem is shortened so the
/// suffixed name stays within [`MAX_NAME_LEN`].
pub fn candidate_name(name: &str, n: u32) -> String {
    if n == 0 {
        return name.to_owned();
    }
    let (stem, ext) = split_extension(name);
    let suffix = format!("_{n}");
    let mut keep = MAX_NAME_LEN
        .saturating_sub(suffix.len() + ext.len())
        .min(stem.len());
    while !stem.is_char_boundary(keep) {
        keep -= 1;
    }
    format!("{}{suffix}{ext}", &stem[..keep])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_is_flattened() {
        let name = sanitize_filename("../../etc/passwd");
        assert!(!name.is_empty());
        assert!(!name.contains('/'));
        assert!(!name.contains(".."));
        assert!(!name.starts_with('.'));
        assert_eq!(name, "file_etcpasswd");
    }

    #[test]
    fn ordinary_names_are_untouched() {
        assert_eq!(sanitize_filename("model.mlir"), "model.mlir");
        assert_eq!(sanitize_filename("bert-base_v2.mlir"), "bert-base_v2.mlir");
    }

    #[test]
    fn strips_unsafe_characters() {
        assert_eq!(sanitize_filename("my model (1).mlir"), "mymodel1.mlir");
        assert_eq!(sanitize_filename("mödel;rm -rf.mlir"), "mdelrm-rf.mlir");
        assert_eq!(sanitize_filename("a\\b:c.mlir"), "abc.mlir");
    }

    #[test]
    fn empty_and_hidden_names_get_prefix() {
        assert_eq!(sanitize_filename(""), "file_");
        assert_eq!(sanitize_filename("///"), "file_");
        assert_eq!(sanitize_filename(".bashrc"), "file_bashrc");
        assert_eq!(sanitize_filename("..."), "file_");
    }

    #[test]
    fn long_names_are_truncated() {
        let long = "a".repeat(300) + ".mlir";
        let name = sanitize_filename(&long);
        assert_eq!(name.len(), MAX_NAME_LEN);
    }

    #[test]
    fn sanitize_is_idempotent() {
        for raw in ["../../etc/passwd", "x..y...z.mlir", ".hidden", "ok.mlir", ""] {
            let once = sanitize_filename(raw);
            assert_eq!(sanitize_filename(&once), once, "{raw}");
        }
    }

    #[test]
    fn extension_split() {
        assert_eq!(split_extension("model.mlir"), ("model", ".mlir"));
        assert_eq!(split_extension("a.tar.gz"), ("a.tar", ".gz"));
        assert_eq!(split_extension("noext"), ("noext", ""));
        assert_eq!(split_extension(".mlir"), (".mlir", ""));
    }

    #[test]
    fn extension_is_enforced_within_limit() {
        assert_eq!(with_extension("model", ".mlir"), "model.mlir");
        assert_eq!(with_extension("model.mlir", ".mlir"), "model.mlir");
        let long = "b".repeat(MAX_NAME_LEN);
        let named = with_extension(&long, ".vmfb");
        assert_eq!(named.len(), MAX_NAME_LEN);
        assert!(named.ends_with(".vmfb"));
    }

    #[test]
    fn candidates_insert_suffix_before_extension() {
        assert_eq!(candidate_name("model.mlir", 0), "model.mlir");
        assert_eq!(candidate_name("model.mlir", 1), "model_1.mlir");
        assert_eq!(candidate_name("model.mlir", 12), "model_12.mlir");
        assert_eq!(candidate_name("noext", 2), "noext_2");
    }

    #[test]
    fn suffixed_candidates_stay_within_limit() {
        let base = with_extension(&"c".repeat(300), ".mlir");
        assert_eq!(base.len(), MAX_NAME_LEN);
        for n in [1, 9, 10, 9_999] {
            let name = candidate_name(&base, n);
            assert!(name.len() <= MAX_NAME_LEN, "{name}");
            assert!(name.ends_with(&format!("_{n}.mlir")), "{name}");
        }
        assert_ne!(candidate_name(&base, 1), candidate_name(&base, 11));
    }
}
