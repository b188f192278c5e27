use std::path::PathBuf;

use time::PrimitiveDateTime;

use crate::takeoutsort_core::config::{AlbumBehavior, DateDivision};
use crate::takeoutsort_core::error::Result;
use crate::takeoutsort_core::paths::{normalize_path, sanitize_filename};

/// Canonical top-level output subtrees.
pub const ALL_PHOTOS_DIR: &str = "ALL_PHOTOS";
pub const ALBUMS_DIR: &str = "Albums";
pub const PARTNER_SHARED_DIR: &str = "PARTNER_SHARED";
pub const DATE_UNKNOWN_DIR: &str = "date-unknown";

/// Everything the moving strategies need to know about the run.
#[derive(Debug, Clone)]
pub struct MovingContext {
    pub output_directory: PathBuf,
    pub date_division: DateDivision,
    pub album_behavior: AlbumBehavior,
    pub divide_partner_shared: bool,
    pub verbose: bool,
}

/// Compute the directory a file belongs in.
///
/// Album folders stay flat; only the ALL_PHOTOS tree is subdivided by
/// date. Undated files land in `date-unknown` when a division is active.
pub fn target_directory(
    album_name: Option<&str>,
    date_taken: Option<&PrimitiveDateTime>,
    partner_shared: bool,
    context: &MovingContext,
) -> Result<PathBuf> {
    let mut dir = context.output_directory.clone();

    if context.divide_partner_shared && partner_shared {
        dir.push(PARTNER_SHARED_DIR);
    }

    match album_name {
        Some(album) => {
            dir.push(ALBUMS_DIR);
            dir.push(sanitize_filename(album)?);
        }
        None => {
            dir.push(ALL_PHOTOS_DIR);
            push_date_subtree(&mut dir, date_taken, context.date_division);
        }
    }

    // Segments ending in spaces or dots are not writable everywhere.
    Ok(normalize_path(&dir))
}

fn push_date_subtree(
    dir: &mut PathBuf,
    date_taken: Option<&PrimitiveDateTime>,
    division: DateDivision,
) {
    if division == DateDivision::None {
        return;
    }
    let Some(date) = date_taken else {
        dir.push(DATE_UNKNOWN_DIR);
        return;
    };
    match division {
        DateDivision::None => {}
        DateDivision::Year => {
            dir.push(format!("{:04}", date.year()));
        }
        DateDivision::YearMonth => {
            dir.push(format!("{:04}", date.year()));
            dir.push(format!("{:02}", date.month() as u8));
        }
        DateDivision::YearMonthDay => {
            dir.push(format!("{:04}", date.year()));
            dir.push(format!("{:02}", date.month() as u8));
            dir.push(format!("{:02}", date.day()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn context(division: DateDivision, partner: bool) -> MovingContext {
        MovingContext {
            output_directory: PathBuf::from("/out"),
            date_division: division,
            album_behavior: AlbumBehavior::Shortcut,
            divide_partner_shared: partner,
            verbose: false,
        }
    }

    #[test]
    fn test_all_photos_divisions() {
        let date = datetime!(2023-06-05 21:20:00);
        let cases = [
            (DateDivision::None, "/out/ALL_PHOTOS"),
            (DateDivision::Year, "/out/ALL_PHOTOS/2023"),
            (DateDivision::YearMonth, "/out/ALL_PHOTOS/2023/06"),
            (DateDivision::YearMonthDay, "/out/ALL_PHOTOS/2023/06/05"),
        ];
        for (division, expected) in cases {
            let dir =
                target_directory(None, Some(&date), false, &context(division, false)).unwrap();
            assert_eq!(dir, PathBuf::from(expected));
        }
    }

    #[test]
    fn test_date_unknown() {
        let dir = target_directory(None, None, false, &context(DateDivision::YearMonth, false))
            .unwrap();
        assert_eq!(dir, PathBuf::from("/out/ALL_PHOTOS/date-unknown"));

        // Without a division, undated files sit directly in ALL_PHOTOS.
        let dir =
            target_directory(None, None, false, &context(DateDivision::None, false)).unwrap();
        assert_eq!(dir, PathBuf::from("/out/ALL_PHOTOS"));
    }

    #[test]
    fn test_album_folders_stay_flat() {
        let date = datetime!(2023-06-05 21:20:00);
        let dir = target_directory(
            Some("Vacation"),
            Some(&date),
            false,
            &context(DateDivision::YearMonthDay, false),
        )
        .unwrap();
        assert_eq!(dir, PathBuf::from("/out/Albums/Vacation"));
    }

    #[test]
    fn test_album_name_sanitized() {
        let dir = target_directory(
            Some("What? A * Trip"),
            None,
            false,
            &context(DateDivision::None, false),
        )
        .unwrap();
        assert_eq!(dir, PathBuf::from("/out/Albums/What_ A _ Trip"));
    }

    #[test]
    fn test_partner_shared_prefix() {
        let date = datetime!(2023-06-05 21:20:00);
        let dir = target_directory(None, Some(&date), true, &context(DateDivision::Year, true))
            .unwrap();
        assert_eq!(dir, PathBuf::from("/out/PARTNER_SHARED/ALL_PHOTOS/2023"));

        // Flag off: partner-shared media routes normally.
        let dir = target_directory(None, Some(&date), true, &context(DateDivision::Year, false))
            .unwrap();
        assert_eq!(dir, PathBuf::from("/out/ALL_PHOTOS/2023"));
    }

    #[test]
    fn test_unicode_album_preserved() {
        let dir = target_directory(
            Some("Cumpleaños 🎂"),
            None,
            false,
            &context(DateDivision::None, false),
        )
        .unwrap();
        assert_eq!(dir, PathBuf::from("/out/Albums/Cumpleaños 🎂"));
    }
}
