//! Field-level validity checks shared by the store and the consistency
//! checker.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Usernames start with an ASCII letter or digit and continue with letters,
/// digits, or `. _ @ + -`. A trailing `.` or `-` is rejected, as is any
/// `..` run.
pub fn is_valid_username(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_alphanumeric() {
        return false;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '@' | '+' | '-')) {
        return false;
    }
    !name.ends_with(['.', '-']) && !name.contains("..")
}

/// Loose structural check: one `@` with a non-empty local part and a
/// dotted, non-empty domain. Deliverability is not our problem.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    if local.chars().any(|c| c.is_whitespace()) || domain.chars().any(|c| c.is_whitespace()) {
        return false;
    }
    let mut labels = domain.split('.');
    labels.clone().count() >= 2 && labels.all(|l| !l.is_empty())
}

/// Validate a stored secret of the form `bcrypt:<cost>:<salt>:<hash>` where
/// salt and hash are standard base64.
pub fn check_hashed_secret(secret: &str) -> Result<(), String> {
    let mut parts = secret.splitn(4, ':');
    let (Some(algo), Some(cost), Some(salt), Some(hash)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err("expected 'bcrypt:<cost>:<salt>:<hash>'".to_string());
    };
    if algo != "bcrypt" {
        return Err(format!("unknown algorithm '{algo}'"));
    }
    let cost: u32 = cost
        .parse()
        .map_err(|_| format!("cost '{cost}' is not a number"))?;
    if !(4..=31).contains(&cost) {
        return Err(format!("cost {cost} outside 4..=31"));
    }
    STANDARD
        .decode(salt)
        .map_err(|e| format!("salt is not valid base64: {e}"))?;
    STANDARD
        .decode(hash)
        .map_err(|e| format!("hash is not valid base64: {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_grammar() {
        for ok in ["jdoe", "j", "a1", "j.doe", "j_doe", "j@host", "j+x", "j-x"] {
            assert!(is_valid_username(ok), "rejected {ok}");
        }
        for bad in ["", ".jdoe", "-jdoe", "_x", "j doe", "jö"] {
            assert!(!is_valid_username(bad), "accepted {bad}");
        }
    }

    #[test]
    fn username_rejects_trailing_and_doubled_separators() {
        for bad in ["jdoe.", "jdoe-", "j..doe", "j.doe.", "a..", "j...d"] {
            assert!(!is_valid_username(bad), "accepted {bad}");
        }
        // A single interior separator stays legal.
        assert!(is_valid_username("j.doe"));
        assert!(is_valid_username("j-doe"));
        assert!(is_valid_username("j.d.o.e"));
    }

    #[test]
    fn email_shapes() {
        for ok in ["a@b.example", "a.b+c@mail.example.com"] {
            assert!(is_valid_email(ok), "rejected {ok}");
        }
        for bad in ["", "a", "@b.example", "a@", "a@b", "a@b..c", "a b@c.example", "a@b@c.example"] {
            assert!(!is_valid_email(bad), "accepted {bad}");
        }
    }

    #[test]
    fn hashed_secret_accepts_well_formed() {
        check_hashed_secret("bcrypt:4:LCbmSBDivK/hhGVQMfkDpA==:XcWn0pKYSVU/UJgOvhidkEtmqCp6oKB7")
            .unwrap();
    }

    #[test]
    fn hashed_secret_rejections() {
        for bad in [
            "plaintext",
            "md5:4:aGk=:aGk=",
            "bcrypt:three:aGk=:aGk=",
            "bcrypt:3:aGk=:aGk=",
            "bcrypt:32:aGk=:aGk=",
            "bcrypt:4:!!!:aGk=",
            "bcrypt:4:aGk=:!!!",
            "bcrypt:4:aGk=",
        ] {
            assert!(check_hashed_secret(bad).is_err(), "accepted {bad}");
        }
    }
}
