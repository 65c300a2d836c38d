//! URL slugs for post titles.
//!
//! Titles are slugified with the `slug` crate (which also transliterates
//! non-ASCII letters). Collisions are resolved by appending `-2`, `-3`, …
//! against an async predicate supplied by the caller.

use std::future::Future;

use slug::slugify;

use super::error::DomainError;

const MAX_SLUG_SUFFIX: usize = 32;

/// Derive the base slug for a post title.
pub fn slug_for_title(title: &str) -> Result<String, DomainError> {
    if title.trim().is_empty() {
        return Err(DomainError::validation("title", "must not be empty"));
    }

    let slug = slugify(title);
    if slug.is_empty() {
        return Err(DomainError::validation(
            "title",
            format!("`{title}` cannot be turned into a slug"),
        ));
    }

    Ok(slug)
}

/// Derive a slug for `title` that `is_taken` reports as free.
///
/// Errors from the predicate are passed through unchanged.
pub async fn unique_slug<F, Fut, E>(title: &str, mut is_taken: F) -> Result<String, E>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: From<DomainError>,
{
    let base = slug_for_title(title)?;
    if !is_taken(base.clone()).await? {
        return Ok(base);
    }

    for suffix in 2..=MAX_SLUG_SUFFIX + 1 {
        let candidate = format!("{base}-{suffix}");
        if !is_taken(candidate.clone()).await? {
            return Ok(candidate);
        }
    }

    Err(DomainError::invariant(format!("no free slug left for `{base}`")).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_lowercased_and_hyphenated() {
        let slug = slug_for_title("  Hello, Async World!  ").expect("slug");
        assert_eq!(slug, "hello-async-world");
    }

    #[test]
    fn blank_title_is_rejected() {
        assert!(matches!(
            slug_for_title("   "),
            Err(DomainError::Validation { field: "title", .. })
        ));
    }

    #[tokio::test]
    async fn taken_slug_gets_numeric_suffix() {
        let existing = ["release-notes".to_string(), "release-notes-2".to_string()];

        let slug = unique_slug("Release Notes", |candidate| {
            let taken = existing.contains(&candidate);
            async move { Ok::<_, DomainError>(taken) }
        })
        .await
        .expect("unique slug");

        assert_eq!(slug, "release-notes-3");
    }
}
