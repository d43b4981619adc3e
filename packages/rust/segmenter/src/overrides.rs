//! Hand-verified replacements for pages the upstream text extraction
//! garbles. Each override swaps a page's raw content for a canonical
//! transcription before segmentation runs.

use ddxbuilder_shared::PageText;

/// Page whose extracted text mangles the first anchor of the
/// diagnostic-requirements window.
pub const FIRST_ANCHOR_PAGE: u32 = 111;

/// Canonical transcription of [`FIRST_ANCHOR_PAGE`].
const FIRST_ANCHOR_PAGE_TEXT: &str = "\
6A00.0 Disorder of intellectual development, mild
\u{2022} In mild disorder of intellectual development, intellectual functioning and adaptive behaviour
are found to be approximately 2\u{2013}3 standard deviations below the mean (approximately
0.1\u{2013}2.3 percentile), based on appropriately normed, individually administered standardized
tests. Where standardized tests are not available, assessment of intellectual functioning and
adaptive behaviour requires greater reliance on clinical judgement, which may include
the use of behavioural indicators provided in Tables 6.1\u{2013}6.4. People with mild disorder of
intellectual development often exhibit difficulties in the acquisition and comprehension of
complex language concepts and academic skills. Most master basic self-care, domestic and
practical activities. Affected people can generally achieve relatively independent living and
employment as adults, but may require appropriate support.
Neurodevelopmental disorders | Disorders of intellectual development";

/// Apply all known page overrides in place. Returns the number of pages
/// replaced.
pub fn apply_page_overrides(pages: &mut [PageText]) -> usize {
    let mut applied = 0;

    for page in pages.iter_mut() {
        if page.page_number == FIRST_ANCHOR_PAGE {
            tracing::debug!(page = page.page_number, "applying canonical page override");
            page.content = FIRST_ANCHOR_PAGE_TEXT.to_string();
            applied += 1;
        }
    }

    applied
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_replaces_first_anchor_page() {
        let mut pages = vec![
            PageText {
                page_number: 110,
                content: "untouched".into(),
            },
            PageText {
                page_number: 111,
                content: "garbled OCR output".into(),
            },
        ];

        let applied = apply_page_overrides(&mut pages);

        assert_eq!(applied, 1);
        assert_eq!(pages[0].content, "untouched");
        assert!(pages[1].content.starts_with("6A00.0 Disorder of intellectual development"));
    }

    #[test]
    fn no_override_outside_known_pages() {
        let mut pages = vec![PageText {
            page_number: 200,
            content: "stays".into(),
        }];

        assert_eq!(apply_page_overrides(&mut pages), 0);
        assert_eq!(pages[0].content, "stays");
    }
}
