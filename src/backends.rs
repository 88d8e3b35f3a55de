/// URL schemes the daemon has a backend for.
const SCHEMES: &[&str] = &["file", "nbd", "http", "https"];

pub fn supports(scheme: &str) -> bool {
    SCHEMES.contains(&scheme)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_schemes() {
        assert!(supports("file"));
        assert!(supports("nbd"));
        assert!(supports("https"));
        assert!(!supports("ftp"));
        assert!(!supports("FILE"));
    }
}
