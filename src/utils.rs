use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{EdfError, Result};
use crate::YEAR_PIVOT;

/// 读取定长ASCII字段并去掉填充空格
pub fn ascii_field(bytes: &[u8], offset: usize, size: usize) -> String {
    let end = (offset + size).min(bytes.len());
    let start = offset.min(end);
    String::from_utf8_lossy(&bytes[start..end]).trim().to_string()
}

/// 检查字符串是否为有效的整数
pub fn is_integer_number(s: &str) -> bool {
    let s = s.trim();
    if s.is_empty() {
        return false;
    }

    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// 非本地化的整数解析（避免受系统locale影响）
pub fn atoi_nonlocalized(s: &str) -> i32 {
    let s = s.trim();
    if s.is_empty() {
        return 0;
    }

    s.parse().unwrap_or(0)
}

/// Strict integer parsing for fields the layout depends on
pub fn parse_int_field(name: &str, s: &str) -> Result<i64> {
    let s = s.trim();
    if !is_integer_number(s) {
        return Err(EdfError::format(format!("{} is not an integer: {:?}", name, s)));
    }
    s.parse::<i64>()
        .map_err(|_| EdfError::format(format!("{} out of range: {:?}", name, s)))
}

/// Strict float parsing for fields the layout depends on
pub fn parse_float_field(name: &str, s: &str) -> Result<f64> {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| EdfError::format(format!("{} is not a number: {:?}", name, s.trim())))
}

/// 解析 "dd.mm.yy" + "hh.mm.ss"，两位年份 > 30 为 19yy，否则 20yy
pub fn parse_start(date_str: &str, time_str: &str) -> Result<NaiveDateTime> {
    let date_parts: Vec<&str> = date_str.trim().split('.').collect();
    if date_parts.len() != 3 {
        return Err(EdfError::format(format!("Invalid start date: {:?}", date_str)));
    }

    let day = atoi_nonlocalized(date_parts[0]);
    let month = atoi_nonlocalized(date_parts[1]);
    let year = {
        let yy = atoi_nonlocalized(date_parts[2]);
        if yy > YEAR_PIVOT { 1900 + yy } else { 2000 + yy }
    };

    let date = NaiveDate::from_ymd_opt(year, month as u32, day as u32)
        .ok_or_else(|| EdfError::format(format!("Invalid start date: {:?}", date_str)))?;

    let time_parts: Vec<&str> = time_str.trim().split('.').collect();
    if time_parts.len() != 3 {
        return Err(EdfError::format(format!("Invalid start time: {:?}", time_str)));
    }

    let hour = atoi_nonlocalized(time_parts[0]);
    let minute = atoi_nonlocalized(time_parts[1]);
    let second = atoi_nonlocalized(time_parts[2]);

    let time = NaiveTime::from_hms_opt(hour as u32, minute as u32, second as u32)
        .ok_or_else(|| EdfError::format(format!("Invalid start time: {:?}", time_str)))?;

    Ok(NaiveDateTime::new(date, time))
}

/// 固定宽度左对齐写入，超长截断
pub fn write_field(dst: &mut [u8], value: &str) {
    dst.fill(b' ');
    let bytes = value.as_bytes();
    let len = bytes.len().min(dst.len());
    dst[..len].copy_from_slice(&bytes[..len]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_is_integer_number() {
        assert!(is_integer_number("123"));
        assert!(is_integer_number("-456"));
        assert!(is_integer_number("+789"));
        assert!(is_integer_number(" 0      "));
        assert!(!is_integer_number("12.34"));
        assert!(!is_integer_number("abc"));
        assert!(!is_integer_number("-"));
        assert!(!is_integer_number(""));
    }

    #[test]
    fn test_ascii_field_trims_and_clamps() {
        let bytes = b"0       Patient X   ";
        assert_eq!(ascii_field(bytes, 0, 8), "0");
        assert_eq!(ascii_field(bytes, 8, 80), "Patient X");
        assert_eq!(ascii_field(bytes, 100, 8), "");
    }

    #[test]
    fn test_parse_start_year_pivot() {
        let old = parse_start("24.12.85", "23.59.58").unwrap();
        assert_eq!(old.year(), 1985);
        assert_eq!(old.month(), 12);
        assert_eq!(old.hour(), 23);
        assert_eq!(old.second(), 58);

        assert_eq!(parse_start("01.01.30", "00.00.00").unwrap().year(), 2030);
        assert_eq!(parse_start("01.01.31", "00.00.00").unwrap().year(), 1931);
    }

    #[test]
    fn test_parse_start_rejects_garbage() {
        assert!(parse_start("32.01.20", "00.00.00").is_err());
        assert!(parse_start("01-01-20", "00.00.00").is_err());
        assert!(parse_start("01.01.20", "25.00.00").is_err());
    }

    #[test]
    fn test_strict_fields() {
        assert_eq!(parse_int_field("n", " 42 ").unwrap(), 42);
        assert!(parse_int_field("n", "4x").is_err());
        assert_eq!(parse_float_field("d", "0.5").unwrap(), 0.5);
        assert!(parse_float_field("d", "").is_err());
    }

    #[test]
    fn test_write_field_pads() {
        let mut buf = [0u8; 8];
        write_field(&mut buf, "uV");
        assert_eq!(&buf, b"uV      ");
        write_field(&mut buf, "0123456789");
        assert_eq!(&buf, b"01234567");
    }
}
