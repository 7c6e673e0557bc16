//! HTTP 相关的小工具。

/// 解析后的字节区间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: u64,
    pub length: u64,
}

#[derive(Debug)]
pub struct ParseRangeError {
    raw: String,
}

impl std::fmt::Display for ParseRangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "invalid range: {}", self.raw)
    }
}

impl std::error::Error for ParseRangeError {}

/// 解析 HTTP 风格的字节区间，`bytes=` 前缀可有可无。
///
/// 支持 `start-end`、`start-`、`-suffix` 三种写法，区间会被钳到
/// `total` 以内。
pub fn parse_range(s: &str, total: u64) -> Result<Range, ParseRangeError> {
    let err = || ParseRangeError { raw: s.to_string() };

    let range = s.trim().trim_start_matches("bytes=");
    let (left, right) = range.split_once('-').ok_or_else(err)?;

    if left.is_empty() {
        // -suffix：末尾 suffix 个字节
        let suffix: u64 = right.parse().map_err(|_| err())?;
        if suffix == 0 || suffix > total {
            return Err(err());
        }
        return Ok(Range {
            start: total - suffix,
            length: suffix,
        });
    }

    let start: u64 = left.parse().map_err(|_| err())?;
    if start >= total {
        return Err(err());
    }

    let end = if right.is_empty() {
        total - 1
    } else {
        let end: u64 = right.parse().map_err(|_| err())?;
        if end < start {
            return Err(err());
        }
        end.min(total - 1)
    };

    Ok(Range {
        start,
        length: end - start + 1,
    })
}
