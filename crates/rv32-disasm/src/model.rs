use std::path::Path;

use anyhow::{bail, ensure, Result};
use clap::ValueEnum;

use rv32i_rs::bits::parse_word;

#[derive(Debug, Clone)]
pub struct Segment {
    pub name: String,
    pub base: u32,
    pub bytes: Vec<u8>,
    pub perms: &'static str,
    pub kind: &'static str,
}

impl Segment {
    fn end(&self) -> u32 {
        self.base.wrapping_add(self.bytes.len() as u32)
    }

    fn contains(&self, addr: u32) -> bool {
        addr >= self.base && addr < self.end()
    }
}

#[derive(Debug, Clone)]
pub struct Image {
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ImageKind {
    /// Text when every non-blank line is a 32-digit binary word, raw otherwise
    Auto,
    /// Assembler output, one binary word per line
    Text,
    /// Little-endian machine words
    Raw,
}

fn text_words(text: &str) -> Option<Vec<u32>> {
    text.lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(parse_word)
        .collect()
}

pub fn parse_text_image(text: &str, base: u32) -> Result<Image> {
    let mut bytes = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(word) = parse_word(line) else {
            bail!("line {}: expected 32 binary digits, got {line:?}", i + 1);
        };
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    let seg = Segment { name: "text".into(), base, bytes, perms: "r-x", kind: "text" };
    Ok(Image { segments: vec![seg] })
}

pub fn raw_image(file: &[u8], base: u32, skip: usize, len: Option<usize>) -> Result<Image> {
    ensure!(skip <= file.len(), "--skip exceeds file size");
    let mut payload = &file[skip..];
    if let Some(lim) = len {
        ensure!(lim <= payload.len(), "--len exceeds remaining file size after skip");
        payload = &payload[..lim];
    }
    let seg = Segment { name: "segment0".into(), base, bytes: payload.to_vec(), perms: "r-x", kind: "raw" };
    Ok(Image { segments: vec![seg] })
}

pub fn load_image(path: &Path, kind: ImageKind, base: u32, skip: usize, len: Option<usize>) -> Result<Image> {
    let file = std::fs::read(path)?;
    let text = std::str::from_utf8(&file).ok();
    match kind {
        ImageKind::Text => match text {
            Some(t) => parse_text_image(t, base),
            None => bail!("{} is not a text image", path.display()),
        },
        ImageKind::Raw => raw_image(&file, base, skip, len),
        ImageKind::Auto => match text.filter(|t| text_words(t).is_some_and(|w| !w.is_empty())) {
            Some(t) => parse_text_image(t, base),
            None => raw_image(&file, base, skip, len),
        },
    }
}

pub fn read_u8(img: &Image, addr: u32) -> Option<u8> {
    img.segments
        .iter()
        .find(|s| s.contains(addr))
        .map(|s| s.bytes[(addr - s.base) as usize])
}

pub fn read_u32(img: &Image, addr: u32) -> Option<u32> {
    let b0 = read_u8(img, addr)?;
    let b1 = read_u8(img, addr.wrapping_add(1))?;
    let b2 = read_u8(img, addr.wrapping_add(2))?;
    let b3 = read_u8(img, addr.wrapping_add(3))?;
    Some(u32::from_le_bytes([b0, b1, b2, b3]))
}

pub fn is_mapped(img: &Image, addr: u32) -> bool {
    img.segments.iter().any(|s| s.contains(addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_loader_maps_skip_and_len() {
        let img = raw_image(&[0u8, 1, 2, 3, 4, 5], 0x1000_0000, 2, Some(4)).unwrap();
        assert_eq!(img.segments.len(), 1);
        let s = &img.segments[0];
        assert_eq!(s.base, 0x1000_0000);
        assert_eq!(s.bytes, vec![2, 3, 4, 5]);
        assert_eq!(read_u32(&img, 0x1000_0000).unwrap(), 0x05040302);
        assert!(read_u32(&img, 0x1000_0001).is_none());
        assert!(raw_image(&[0u8; 4], 0, 5, None).is_err());
    }

    #[test]
    fn text_image_is_stored_little_endian() {
        let img = parse_text_image("00000000001100010000000010110011\n\n", 0).unwrap();
        assert_eq!(img.segments[0].bytes, vec![0xb3, 0x00, 0x31, 0x00]);
        assert_eq!(read_u32(&img, 0), Some(0x0031_00b3));
        assert!(parse_text_image("0101\n", 0).is_err());
    }

    #[test]
    fn auto_detects_text() {
        assert!(text_words("00000000001100010000000010110011\n").is_some());
        assert!(text_words("hello\n").is_none());
    }
}
