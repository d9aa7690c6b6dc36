/// Convert text into a lowercase, hyphen-separated URL-safe slug.
///
/// Runs of anything other than ASCII letters and digits collapse into a
/// single `-`, with no leading or trailing separator. Text with nothing
/// slug-worthy becomes `doc`.
pub fn slugify(text: &str) -> String {
    let slug = text
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    if slug.is_empty() {
        "doc".to_string()
    } else {
        slug
    }
}
