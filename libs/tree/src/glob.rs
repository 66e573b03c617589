//! Wildcard matching over a [`Tree`].

use crate::error::{Result, TreeError};
use crate::Tree;

pub(crate) fn glob<T: Tree + ?Sized>(tree: &T, pattern: &str) -> Result<Vec<String>> {
    let segments = crate::split_path(pattern)?;
    let mut candidates = vec![String::new()];

    for segment in segments {
        let mut next = Vec::new();
        for base in &candidates {
            if has_wildcard(segment) {
                let names = match tree.list(base) {
                    Ok(names) => names,
                    Err(TreeError::Io(e)) => return Err(TreeError::Io(e)),
                    Err(_) => continue,
                };
                next.extend(
                    names
                        .iter()
                        .filter(|name| matches(segment, name))
                        .map(|name| join(base, name)),
                );
            } else {
                let path = join(base, segment);
                if tree.exists(&path) {
                    next.push(path);
                }
            }
        }
        candidates = next;
    }

    candidates.retain(|path| !path.is_empty());
    candidates.sort();
    Ok(candidates)
}

fn join(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{base}/{name}")
    }
}

fn has_wildcard(segment: &str) -> bool {
    segment.contains(['*', '?'])
}

/// Match `name` against a single-segment pattern.
fn matches(pattern: &str, name: &str) -> bool {
    if name.starts_with('.') && !pattern.starts_with('.') {
        return false;
    }

    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    let (mut p, mut n) = (0, 0);
    // Position after the last `*` and the name index it was tried at.
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p + 1, n));
                p += 1;
            }
            Some('?') => {
                p += 1;
                n += 1;
            }
            Some(&c) if c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match backtrack {
                Some((star_p, star_n)) => {
                    p = star_p;
                    n = star_n + 1;
                    backtrack = Some((star_p, star_n + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_star() {
        assert!(matches("vmlinuz-*", "vmlinuz-4.9.0-6-amd64"));
        assert!(matches("vmlinuz*", "vmlinuz"));
        assert!(!matches("vmlinuz-*", "initrd.img-4.9.0"));
        assert!(matches("*.img-*", "initrd.img-4.9.0"));
    }

    #[test]
    fn test_matches_question_mark() {
        assert!(matches("isolinux.cf?", "isolinux.cfg"));
        assert!(!matches("isolinux.cf?", "isolinux.cf"));
    }

    #[test]
    fn test_wildcard_skips_hidden_names() {
        assert!(!matches("*", ".disk"));
        assert!(matches(".d*", ".disk"));
    }
}
