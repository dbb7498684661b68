//! Share link parsing
//!
//! Users paste links in many shapes: bare URLs, URLs with a passcode query
//! parameter, URLs pointing into a sub-folder, or the whole share message
//! with bracketed decorations around the link.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::error::{Error, Result};

/// Folder id of the share root
pub const ROOT_FOLDER_ID: &str = "0";

/// The parts of a share link needed to open the share
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLink {
    /// Share identifier (`pwd_id`)
    pub pwd_id: String,
    /// Four-character extraction code, empty when the link carries none
    pub passcode: String,
    /// Folder to start enumerating from ("0" = share root)
    pub start_folder_id: String,
}

// Literal patterns, checked by the tests below
#[allow(clippy::unwrap_used)]
static PWD_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/s/([a-zA-Z0-9]+)").unwrap());
#[allow(clippy::unwrap_used)]
static PASSCODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[?&](?:pwd|passcode|password|pw)=([a-zA-Z0-9]{4})").unwrap()
});
#[allow(clippy::unwrap_used)]
static FOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#/list/share/([a-zA-Z0-9]+)").unwrap());
#[allow(clippy::unwrap_used)]
static BRACKETS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[.*?\]").unwrap());

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Parse a pasted share link
///
/// # Examples
///
/// ```
/// use quark_share_dl::share_link::parse_share_url;
///
/// let link = parse_share_url("https://pan.quark.cn/s/abc123?pwd=x7Yz").unwrap();
/// assert_eq!(link.pwd_id, "abc123");
/// assert_eq!(link.passcode, "x7Yz");
/// assert_eq!(link.start_folder_id, "0");
/// ```
pub fn parse_share_url(input: &str) -> Result<ShareLink> {
    let cleaned = BRACKETS.replace_all(input.trim(), "");

    let pwd_id = first_capture(&PWD_ID, &cleaned)
        .ok_or_else(|| Error::InvalidShareLink(input.trim().to_string()))?;
    let passcode = first_capture(&PASSCODE, &cleaned).unwrap_or_default();
    let start_folder_id =
        first_capture(&FOLDER, &cleaned).unwrap_or_else(|| ROOT_FOLDER_ID.to_string());

    Ok(ShareLink {
        pwd_id,
        passcode,
        start_folder_id,
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_link() {
        let link = parse_share_url("https://pan.quark.cn/s/a1b2c3d4e5").unwrap();
        assert_eq!(link.pwd_id, "a1b2c3d4e5");
        assert_eq!(link.passcode, "");
        assert_eq!(link.start_folder_id, ROOT_FOLDER_ID);
    }

    #[test]
    fn parses_passcode_aliases_case_insensitively() {
        for query in ["pwd=Ab12", "PASSCODE=Ab12", "password=Ab12", "Pw=Ab12"] {
            let url = format!("https://pan.quark.cn/s/abc?{query}");
            let link = parse_share_url(&url).unwrap();
            assert_eq!(link.passcode, "Ab12", "query {query} not understood");
        }
    }

    #[test]
    fn passcode_after_other_params() {
        let link = parse_share_url("https://pan.quark.cn/s/abc?entry=sharepage&pwd=zz99").unwrap();
        assert_eq!(link.passcode, "zz99");
    }

    #[test]
    fn parses_start_folder_from_fragment() {
        let link =
            parse_share_url("https://pan.quark.cn/s/abc#/list/share/9f8e7d6c5b").unwrap();
        assert_eq!(link.pwd_id, "abc");
        assert_eq!(link.start_folder_id, "9f8e7d6c5b");
    }

    #[test]
    fn strips_bracketed_decorations() {
        let link = parse_share_url(
            "我用夸克网盘分享了「资料」[点击链接保存] https://pan.quark.cn/s/ff00ee11 [提取码]",
        )
        .unwrap();
        assert_eq!(link.pwd_id, "ff00ee11");
    }

    #[test]
    fn repeated_parses_agree() {
        let url = "https://pan.quark.cn/s/abc?pwd=Ab12#/list/share/f1";
        let first = parse_share_url(url).unwrap();
        for _ in 0..3 {
            assert_eq!(parse_share_url(url).unwrap(), first);
        }
        assert_eq!(first.start_folder_id, "f1");
    }

    #[test]
    fn rejects_link_without_share_id() {
        let err = parse_share_url("https://pan.quark.cn/list").unwrap_err();
        assert!(matches!(err, Error::InvalidShareLink(_)));
    }
}
