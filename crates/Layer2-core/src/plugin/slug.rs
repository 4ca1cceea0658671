//! Slug - 플러그인 식별자 규칙
//!
//! slug는 라우트, 설정 파일, 리소스의 네임스페이스로 쓰이며 등록 후 바뀌지 않는다.

use super::error::PluginError;
use regex::Regex;
use std::sync::OnceLock;

/// 기본 예약어 (대소문자 무시)
pub const DEFAULT_RESERVED_SLUGS: &[&str] =
    &["system", "api", "internal", "plugin", "plugins", "modhost"];

/// 최대 길이
pub const MAX_SLUG_LEN: usize = 32;

fn slug_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]{1,31}$").expect("valid slug pattern"))
}

/// slug 검증
///
/// 영문자로 시작, 영문자/숫자/밑줄만, 2-32자, 예약어 불가.
pub fn validate_slug(slug: &str, reserved: &[String]) -> Result<(), PluginError> {
    if slug.is_empty() {
        return Err(PluginError::InvalidSlug {
            slug: String::new(),
            reason: "slug cannot be empty".to_string(),
        });
    }

    if !slug_pattern().is_match(slug) {
        return Err(PluginError::InvalidSlug {
            slug: slug.to_string(),
            reason: "must start with a letter, contain only letters/numbers/underscores, 2-32 chars"
                .to_string(),
        });
    }

    if reserved.iter().any(|r| r.eq_ignore_ascii_case(slug)) {
        return Err(PluginError::InvalidSlug {
            slug: slug.to_string(),
            reason: "slug is reserved".to_string(),
        });
    }

    Ok(())
}

/// 인덱스 키 (대소문자 무시)
pub fn slug_key(slug: &str) -> String {
    slug.to_ascii_lowercase()
}

/// 이름을 유효한 slug로 변환
///
/// 소문자화, 공백/`-`/`_` 연속은 `_` 하나로, 첫 글자 숫자 제거,
/// 2자 미만이면 `_plugin` 접미사, 32자에서 자름.
/// 남는 글자가 없으면 `unnamed`.
pub fn sanitize_slug(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut prev_underscore = false;

    for c in name.chars() {
        if c.is_ascii_alphabetic() {
            result.push(c.to_ascii_lowercase());
            prev_underscore = false;
        } else if c.is_ascii_digit() && !result.is_empty() {
            result.push(c);
            prev_underscore = false;
        } else if matches!(c, ' ' | '-' | '_') && !prev_underscore && !result.is_empty() {
            result.push('_');
            prev_underscore = true;
        }
    }

    while result.ends_with('_') {
        result.pop();
    }

    if result.is_empty() {
        result.push_str("unnamed");
    }

    if result.len() < 2 {
        result.push_str("_plugin");
    }

    result.truncate(MAX_SLUG_LEN);
    result
}
