use crate::canonical::CanonicalUrl;
use std::collections::HashSet;
use std::net::Ipv4Addr;

/// Hard cap on derived expressions per URL (5 host variants x 6 path
/// variants), bounding worst-case work per lookup.
pub const MAX_EXPRESSIONS: usize = 30;

const MAX_SUFFIX_LABELS: usize = 5;
const MAX_PATH_PREFIX_SEGMENTS: usize = 3;

/// Derives the deduplicated (host-suffix, path-prefix) combinations the
/// remote service indexes a URL under.
pub fn lookup_expressions(url: &CanonicalUrl) -> Vec<String> {
    let hosts = host_variants(&url.host);
    let paths = path_variants(&url.path, url.query.as_deref());

    let mut seen = HashSet::new();
    let mut expressions = Vec::new();
    for host in &hosts {
        for path in &paths {
            let expression = format!("{host}{path}");
            if seen.insert(expression.clone()) {
                expressions.push(expression);
            }
        }
    }
    debug_assert!(expressions.len() <= MAX_EXPRESSIONS);
    expressions
}

/// The exact host plus up to four trailing-label suffixes of at least two
/// labels, drawn from the last five. IP hosts get no suffix variants.
fn host_variants(host: &str) -> Vec<String> {
    if host.parse::<Ipv4Addr>().is_ok() || host.starts_with('[') {
        return vec![host.to_string()];
    }
    let labels: Vec<&str> = host.split('.').collect();
    let mut variants = vec![host.to_string()];
    let longest = labels.len().saturating_sub(1).min(MAX_SUFFIX_LABELS);
    for take in (2..=longest).rev() {
        variants.push(labels[labels.len() - take..].join("."));
    }
    variants
}

/// Path plus query, bare path, then `/` and up to three leading directory
/// prefixes. The final path segment is covered by the bare-path variant,
/// so prefixes stop at the last directory.
fn path_variants(path: &str, query: Option<&str>) -> Vec<String> {
    let mut variants = Vec::new();
    if let Some(query) = query {
        variants.push(format!("{path}?{query}"));
    }
    variants.push(path.to_string());

    let directory = match path.rfind('/') {
        Some(pos) => &path[..=pos],
        None => "/",
    };
    let segments: Vec<&str> = directory.split('/').filter(|s| !s.is_empty()).collect();
    let mut prefix = String::from("/");
    variants.push(prefix.clone());
    for segment in segments.iter().take(MAX_PATH_PREFIX_SEGMENTS) {
        prefix.push_str(segment);
        prefix.push('/');
        variants.push(prefix.clone());
    }
    variants
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::canonicalize;

    fn expressions_for(url: &str) -> Vec<String> {
        lookup_expressions(&canonicalize(url).unwrap())
    }

    #[test]
    fn short_host_and_file_path() {
        let expressions = expressions_for("http://a.b.c/1/2.html?param=1");
        let expected = [
            "a.b.c/1/2.html?param=1",
            "a.b.c/1/2.html",
            "a.b.c/",
            "a.b.c/1/",
            "b.c/1/2.html?param=1",
            "b.c/1/2.html",
            "b.c/",
            "b.c/1/",
        ];
        assert_eq!(expressions.len(), expected.len());
        for expression in expected {
            assert!(expressions.contains(&expression.to_string()), "{expression}");
        }
    }

    #[test]
    fn long_host_uses_last_five_labels() {
        let expressions = expressions_for("http://a.b.c.d.e.f.g/1.html");
        let expected = [
            "a.b.c.d.e.f.g/1.html",
            "a.b.c.d.e.f.g/",
            "c.d.e.f.g/1.html",
            "c.d.e.f.g/",
            "d.e.f.g/1.html",
            "d.e.f.g/",
            "e.f.g/1.html",
            "e.f.g/",
            "f.g/1.html",
            "f.g/",
        ];
        assert_eq!(expressions.len(), expected.len());
        for expression in expected {
            assert!(expressions.contains(&expression.to_string()), "{expression}");
        }
    }

    #[test]
    fn ip_hosts_get_no_suffix_variants() {
        let expressions = expressions_for("http://1.2.3.4/1/");
        assert_eq!(
            expressions,
            vec!["1.2.3.4/1/".to_string(), "1.2.3.4/".to_string()]
        );
    }

    #[test]
    fn bare_root_deduplicates() {
        assert_eq!(
            expressions_for("http://evil.com/"),
            vec!["evil.com/".to_string()]
        );
    }

    #[test]
    fn expression_count_is_bounded() {
        let url = "http://a.b.c.d.e.f.g.h.i.j/1/2/3/4/5/6/7.html?x=1&y=2";
        let expressions = expressions_for(url);
        assert!(expressions.len() <= MAX_EXPRESSIONS);

        let unique: std::collections::HashSet<_> = expressions.iter().collect();
        assert_eq!(unique.len(), expressions.len(), "expressions must be deduplicated");
    }
}
