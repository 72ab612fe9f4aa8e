// On-disk timestamp conversions
// Each format counts from its own epoch; all conversions produce UTC.
// Invalid or zero timestamps map to None rather than a made-up date.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};

fn epoch(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Seconds since 1970-01-01.
pub fn unix_to_datetime(seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(seconds, 0)
}

/// Seconds since 1978-01-01, the AmigaDOS epoch (Unix epoch plus eight years).
pub fn amiga_to_datetime(seconds: u32) -> Option<DateTime<Utc>> {
    epoch(1978, 1, 1).checked_add_signed(Duration::seconds(seconds as i64))
}

/// Seconds since 1904-01-01, the classic Mac OS epoch.
pub fn mac_to_datetime(seconds: u32) -> Option<DateTime<Utc>> {
    if seconds == 0 {
        return None;
    }
    epoch(1904, 1, 1).checked_add_signed(Duration::seconds(seconds as i64))
}

/// 100 ns ticks since 1858-11-17, the VMS/Modified Julian Date epoch.
pub fn vms_to_datetime(ticks: u64) -> Option<DateTime<Utc>> {
    if ticks == 0 {
        return None;
    }
    let seconds = (ticks / 10_000_000) as i64;
    let nanos = ((ticks % 10_000_000) * 100) as i64;
    epoch(1858, 11, 17)
        .checked_add_signed(Duration::seconds(seconds))?
        .checked_add_signed(Duration::nanoseconds(nanos))
}

/// ProDOS packed date (yyyyyyym mmmddddd) and time (000hhhhh 00mmmmmm).
/// Years below 40 belong to the 2000s.
pub fn prodos_to_datetime(date: u16, time: u16) -> Option<DateTime<Utc>> {
    if date == 0 {
        return None;
    }
    let raw_year = (date >> 9) as i32;
    let year = if raw_year < 40 { 2000 + raw_year } else { 1900 + raw_year };
    let month = ((date >> 5) & 0x0F) as u32;
    let day = (date & 0x1F) as u32;
    let hour = ((time >> 8) & 0x1F) as u32;
    let minute = (time & 0x3F) as u32;

    NaiveDate::from_ymd_opt(year, month, day)?
        .and_hms_opt(hour, minute, 0)
        .map(|dt| dt.and_utc())
}

/// UCSD Pascal packed date: bits 0-3 month, 4-8 day, 9-15 years since 1900.
/// Year 100 marks a temporary file and has no date.
pub fn ucsd_to_datetime(date: u16) -> Option<DateTime<Utc>> {
    let month = (date & 0x0F) as u32;
    let day = ((date >> 4) & 0x1F) as u32;
    let year = (date >> 9) as i32;
    if year >= 100 {
        return None;
    }
    NaiveDate::from_ymd_opt(1900 + year, month, day)?
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
}

fn ascii_digits(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    Some(bytes.iter().fold(0u32, |acc, b| acc * 10 + (b - b'0') as u32))
}

/// ISO 9660 "dec-datetime": 16 ASCII digits (YYYYMMDDHHMMSScc) plus a signed
/// offset from GMT in 15-minute units. All-zero digits mean "not specified".
pub fn iso9660_to_datetime(field: &[u8; 17]) -> Option<DateTime<Utc>> {
    let year = ascii_digits(&field[0..4])? as i32;
    if year == 0 {
        return None;
    }
    let month = ascii_digits(&field[4..6])?;
    let day = ascii_digits(&field[6..8])?;
    let hour = ascii_digits(&field[8..10])?;
    let minute = ascii_digits(&field[10..12])?;
    let second = ascii_digits(&field[12..14])?;
    let centis = ascii_digits(&field[14..16])?;
    let offset = FixedOffset::east_opt(field[16] as i8 as i32 * 15 * 60)?;

    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_milli_opt(hour, minute, second, centis * 10)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn bcd(byte: u8) -> Option<u32> {
    let (hi, lo) = (byte >> 4, byte & 0x0F);
    if hi > 9 || lo > 9 {
        return None;
    }
    Some(hi as u32 * 10 + lo as u32)
}

/// HP LIF 6-byte BCD date YY MM DD hh mm ss. Years below 70 belong to the 2000s.
pub fn lif_to_datetime(field: &[u8; 6]) -> Option<DateTime<Utc>> {
    if field.iter().all(|&b| b == 0) {
        return None;
    }
    let yy = bcd(field[0])? as i32;
    let year = if yy < 70 { 2000 + yy } else { 1900 + yy };
    NaiveDate::from_ymd_opt(year, bcd(field[1])?, bcd(field[2])?)?
        .and_hms_opt(bcd(field[3])?, bcd(field[4])?, bcd(field[5])?)
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_amiga_epoch_offset() {
        let dt = amiga_to_datetime(0).unwrap();
        assert_eq!(dt.timestamp(), 252_460_800);
        assert_eq!(dt.year(), 1978);
    }

    #[test]
    fn test_mac_epoch() {
        // 1970-01-01 is 2082844800 seconds after 1904-01-01
        assert_eq!(mac_to_datetime(2_082_844_800).unwrap().timestamp(), 0);
        assert!(mac_to_datetime(0).is_none());
    }

    #[test]
    fn test_vms_epoch() {
        // 1970-01-01 is 40587 days after 1858-11-17
        let ticks = 40_587u64 * 86_400 * 10_000_000;
        assert_eq!(vms_to_datetime(ticks).unwrap().timestamp(), 0);
    }

    #[test]
    fn test_prodos_date() {
        // 1991-05-17 13:45
        let date = (91 << 9) | (5 << 5) | 17;
        let time = (13 << 8) | 45;
        let dt = prodos_to_datetime(date, time).unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day(), dt.hour(), dt.minute()), (1991, 5, 17, 13, 45));

        let y2k = prodos_to_datetime((5 << 9) | (1 << 5) | 2, 0).unwrap();
        assert_eq!(y2k.year(), 2005);
    }

    #[test]
    fn test_ucsd_date() {
        let date = (79 << 9) | (12 << 4) | 3;
        let dt = ucsd_to_datetime(date).unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (1979, 3, 12));
        assert!(ucsd_to_datetime(100 << 9 | 0x11).is_none());
    }

    #[test]
    fn test_iso9660_date_with_offset() {
        let mut field = [0u8; 17];
        field[..16].copy_from_slice(b"1995071412000000");
        field[16] = 8; // GMT+2
        let dt = iso9660_to_datetime(&field).unwrap();
        assert_eq!(dt.hour(), 10);

        let mut unset = [b'0'; 17];
        unset[16] = 0;
        assert!(iso9660_to_datetime(&unset).is_none());
    }

    #[test]
    fn test_lif_bcd_date() {
        let dt = lif_to_datetime(&[0x87, 0x06, 0x30, 0x23, 0x59, 0x01]).unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day(), dt.hour()), (1987, 6, 30, 23));
        assert!(lif_to_datetime(&[0x9A, 0, 0, 0, 0, 0]).is_none());
    }
}
