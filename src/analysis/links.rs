use crate::models::PackageKey;

/// Web link to the commit a package was built from.
///
/// `https://github.com/lsst/afw.git` + `abc` becomes
/// `https://github.com/lsst/afw/commit/abc`.
pub fn commit_url(git_url: &str, git_commit: &str) -> String {
    let base = git_url.trim_end_matches('/');
    let base = base.strip_suffix(".git").unwrap_or(base);
    format!("{base}/commit/{git_commit}")
}

/// Splits changed packages into display names and commit links, co-indexed.
pub fn package_links(packages: &[PackageKey]) -> (Vec<String>, Vec<String>) {
    packages
        .iter()
        .map(|package| {
            (
                package.name.clone(),
                commit_url(&package.git_url, &package.git_commit),
            )
        })
        .unzip()
}
