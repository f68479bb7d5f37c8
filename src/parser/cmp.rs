//! Extraction from ClrMamePro (CMP) text DAT files
//!
//! The format is a sequence of parenthesized clauses:
//!
//! ```text
//! clrmamepro ( name "Commodore C64 - Games" version 2012 )
//! game (
//!     name "Test Game (1986)"
//!     description "Test Game"
//!     rom ( name "test.d64" size 174848 crc 12345678 md5 ... sha1 ... )
//! )
//! ```
//!
//! Blocks are found with an explicit depth-counting scanner that tracks
//! three states: outside any block, inside a block at depth N, and inside a
//! quoted string. Parentheses inside quotes never change the depth, and
//! scanning resumes after the end of each block, so blocks never overlap.

use crate::catalog::{CatalogFile, GameEntry, RawRom, RomRecord, UNKNOWN};
use crate::error::{ParseError, ParseResult};
use crate::parser::size::normalize_size;
use std::collections::VecDeque;
use std::fs;

/// Top-level clause keywords that describe a game
const BLOCK_KEYWORDS: &[&str] = &["game", "resource", "machine"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Open,
    Close,
    Quoted(&'a str),
    Word(&'a str),
}

/// Position and reason of a syntax problem
#[derive(Debug)]
struct Syntax {
    position: usize,
    reason: &'static str,
}

type SyntaxResult<T> = std::result::Result<T, Syntax>;

/// Fields of one `game ( ... )` block
#[derive(Debug, Default)]
struct CmpBlock {
    name: Option<String>,
    description: Option<String>,
    roms: Vec<RawRom>,
}

/// Read the token starting at or after `pos`, returning it with the offset
/// just past it.
fn lex(content: &str, pos: usize) -> SyntaxResult<Option<(Token<'_>, usize)>> {
    let bytes = content.as_bytes();
    let mut i = pos;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= bytes.len() {
        return Ok(None);
    }

    let token = match bytes[i] {
        b'(' => (Token::Open, i + 1),
        b')' => (Token::Close, i + 1),
        b'"' => {
            let start = i + 1;
            let Some(len) = content[start..].find('"') else {
                return Err(Syntax {
                    position: i,
                    reason: "unterminated quoted string",
                });
            };
            (Token::Quoted(&content[start..start + len]), start + len + 1)
        }
        _ => {
            let start = i;
            while i < bytes.len()
                && !bytes[i].is_ascii_whitespace()
                && !matches!(bytes[i], b'(' | b')' | b'"')
            {
                i += 1;
            }
            (Token::Word(&content[start..i]), i)
        }
    };
    Ok(Some(token))
}

/// Skip the remainder of a clause whose `(` was already consumed
fn skip_clause(content: &str, pos: &mut usize) -> SyntaxResult<()> {
    let start = *pos;
    let mut depth = 1usize;
    while depth > 0 {
        let Some((token, next)) = lex(content, *pos)? else {
            return Err(Syntax {
                position: start,
                reason: "unterminated clause",
            });
        };
        *pos = next;
        match token {
            Token::Open => depth += 1,
            Token::Close => depth -= 1,
            _ => {}
        }
    }
    Ok(())
}

/// Bare markers that stand alone inside a `rom ( ... )` clause
const FLAG_TOKENS: &[&str] = &["baddump", "nodump", "verified", "good"];

const ROM_KEYS: &[&str] = &[
    "name", "size", "crc", "md5", "sha1", "sha256", "status", "flags", "merge", "date", "serial",
];

const BLOCK_KEYS: &[&str] = &[
    "name", "description", "year", "manufacturer", "cloneof", "romof", "sampleof", "comment",
];

fn is_one_of(word: &str, set: &[&str]) -> bool {
    set.iter().any(|k| word.eq_ignore_ascii_case(k))
}

/// Read `key value` pairs until the clause closes, calling `on_pair` for
/// each and skipping nested clauses. A bare flag, or a word followed by one
/// of `keys`, has no value and is dropped without consuming the next token.
fn read_pairs<'a>(
    content: &'a str,
    pos: &mut usize,
    keys: &[&str],
    mut on_pair: impl FnMut(&str, &'a str),
    mut on_clause: impl FnMut(&str, &mut usize) -> SyntaxResult<()>,
) -> SyntaxResult<()> {
    let start = *pos;
    loop {
        let Some((token, next)) = lex(content, *pos)? else {
            return Err(Syntax {
                position: start,
                reason: "unterminated block",
            });
        };
        *pos = next;

        match token {
            Token::Close => return Ok(()),
            Token::Open => skip_clause(content, pos)?,
            Token::Quoted(_) => {}
            Token::Word(key) if is_one_of(key, FLAG_TOKENS) => {}
            Token::Word(key) => match lex(content, *pos)? {
                Some((Token::Open, next)) => {
                    *pos = next;
                    on_clause(key, &mut *pos)?;
                }
                Some((Token::Word(value), _)) if is_one_of(value, keys) => {}
                Some((Token::Quoted(value), next)) | Some((Token::Word(value), next)) => {
                    *pos = next;
                    on_pair(key, value);
                }
                // Close or end of input is handled on the next iteration
                _ => {}
            },
        }
    }
}

fn parse_rom(content: &str, pos: &mut usize) -> SyntaxResult<RawRom> {
    let mut rom = RawRom::default();
    read_pairs(
        content,
        pos,
        ROM_KEYS,
        |key, value| {
            let slot = match key.to_ascii_lowercase().as_str() {
                "name" => {
                    if rom.name.is_empty() {
                        rom.name = value.to_string();
                    }
                    return;
                }
                "size" => &mut rom.size,
                "crc" => &mut rom.crc,
                "md5" => &mut rom.md5,
                "sha1" => &mut rom.sha1,
                "status" => &mut rom.status,
                _ => return,
            };
            if slot.is_none() {
                *slot = Some(value.to_string());
            }
        },
        |_, pos| skip_clause(content, pos),
    )?;
    Ok(rom)
}

fn parse_block(content: &str, pos: &mut usize) -> SyntaxResult<CmpBlock> {
    let mut name = None;
    let mut description = None;
    let mut roms = Vec::new();

    read_pairs(
        content,
        pos,
        BLOCK_KEYS,
        |key, value| {
            if key.eq_ignore_ascii_case("name") && name.is_none() {
                name = Some(value.to_string());
            } else if key.eq_ignore_ascii_case("description") && description.is_none() {
                description = Some(value.to_string());
            }
        },
        |key, pos| {
            if key.eq_ignore_ascii_case("rom") {
                roms.push(parse_rom(content, pos)?);
                Ok(())
            } else {
                skip_clause(content, pos)
            }
        },
    )?;

    Ok(CmpBlock {
        name,
        description,
        roms,
    })
}

/// Find and parse the next game block at or after `pos`
fn next_block(content: &str, pos: &mut usize) -> SyntaxResult<Option<CmpBlock>> {
    while let Some((token, next)) = lex(content, *pos)? {
        *pos = next;
        match token {
            Token::Word(word) => {
                let Some((Token::Open, after)) = lex(content, *pos)? else {
                    continue;
                };
                *pos = after;
                if BLOCK_KEYWORDS.iter().any(|k| word.eq_ignore_ascii_case(k)) {
                    return parse_block(content, pos).map(Some);
                }
                skip_clause(content, pos)?;
            }
            Token::Open => skip_clause(content, pos)?,
            Token::Close | Token::Quoted(_) => {}
        }
    }
    Ok(None)
}

/// Lazy record iterator over one CMP DAT file, one block at a time
pub struct CmpRecords {
    content: String,
    pos: usize,
    file: CatalogFile,
    pending: VecDeque<RomRecord>,
    done: bool,
}

impl CmpRecords {
    /// Read a catalog file. Invalid UTF-8 is replaced, never an error.
    pub fn open(file: &CatalogFile) -> ParseResult<Self> {
        let bytes = fs::read(&file.path).map_err(|source| ParseError::Io {
            path: file.path.clone(),
            source,
        })?;
        Ok(Self::from_text(
            file.clone(),
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    }

    /// Parse records from text already in memory
    pub fn from_text(file: CatalogFile, content: String) -> Self {
        Self {
            content,
            pos: 0,
            file,
            pending: VecDeque::new(),
            done: false,
        }
    }

    fn queue_block(&mut self, block: CmpBlock) -> ParseResult<()> {
        let name = block.name.unwrap_or_else(|| UNKNOWN.to_string());
        let game = GameEntry::new(&name, block.description.as_deref().unwrap_or(""));

        for rom in block.roms {
            if rom.name.is_empty() {
                continue;
            }
            let size = normalize_size(rom.size.as_deref()).map_err(|source| ParseError::Size {
                path: self.file.path.clone(),
                rom: rom.name.clone(),
                source,
            })?;
            self.pending
                .push_back(RomRecord::assemble(&self.file, &game, rom, size));
        }
        Ok(())
    }

    fn advance(&mut self) -> ParseResult<()> {
        match next_block(&self.content, &mut self.pos) {
            Ok(Some(block)) => self.queue_block(block),
            Ok(None) => {
                self.done = true;
                Ok(())
            }
            Err(syntax) => Err(ParseError::Cmp {
                path: self.file.path.clone(),
                position: syntax.position as u64,
                reason: syntax.reason.to_string(),
            }),
        }
    }
}

impl Iterator for CmpRecords {
    type Item = ParseResult<RomRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(Ok(record));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.advance() {
                self.done = true;
                self.pending.clear();
                return Some(Err(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"clrmamepro (
    name "Commodore 64 - Games"
    description "Commodore 64 - Games (TOSEC-v2012)"
    version 2012
)

game (
    name "Test Game (1986)"
    description "Test Game Description"
    rom ( name "test.zip" size 100 crc 12345678 md5 abcdef123456 sha1 1234567890abcdef )
)

game (
    name "Another Game"
    description "Just another game"
    rom ( name "game2.rom" size 200 crc AABBCCDD md5 11223344 sha1 55667788 )
)
"#;

    fn parse(text: &str) -> Vec<ParseResult<RomRecord>> {
        let file = CatalogFile::new("/dats/Commodore/Commodore C64 - Games (TOSEC-v2012-01-01).dat", 0);
        CmpRecords::from_text(file, text.to_string()).collect()
    }

    fn ok(text: &str) -> Vec<RomRecord> {
        parse(text).into_iter().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_two_blocks() {
        let records = ok(SAMPLE);
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].game_name, "Test Game (1986)");
        assert_eq!(records[0].title, "Test Game");
        assert_eq!(records[0].release_year, Some(1986));
        assert_eq!(records[0].description, "Test Game Description");
        assert_eq!(records[0].rom_name, "test.zip");
        assert_eq!(records[0].size, 100);
        assert_eq!(records[0].crc, "12345678");
        assert_eq!(records[0].status, "good");
        assert_eq!(records[0].platform, "Commodore C64");

        assert_eq!(records[1].game_name, "Another Game");
        assert_eq!(records[1].rom_name, "game2.rom");
        assert_eq!(records[1].size, 200);
        assert_eq!(records[1].crc, "AABBCCDD");
        assert_eq!(records[1].sha1, "55667788");
    }

    #[test]
    fn test_nested_parens_do_not_end_block() {
        let text = r#"game (
    name "Paren (Disk 1) Game"
    description "desc (with parens)"
    disk ( name "inner" ( extra ) )
    rom ( name "a (b).bin" size 0x10 crc 01 )
    rom ( name "c.bin" size 2k status baddump )
)
game ( name "Next" rom ( name "n.bin" size 1 ) )
"#;
        let records = ok(text);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].rom_name, "a (b).bin");
        assert_eq!(records[0].size, 16);
        assert_eq!(records[0].description, "desc (with parens)");
        assert_eq!(records[1].size, 2048);
        assert_eq!(records[1].status, "baddump");
        assert_eq!(records[2].game_name, "Next");
    }

    #[test]
    fn test_game_keyword_inside_header_string_is_ignored() {
        let text = r#"clrmamepro ( description "Some game (1990) list" )
game ( name "Real" rom ( name "r.bin" size 1 ) )"#;
        let records = ok(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].game_name, "Real");
    }

    #[test]
    fn test_rom_without_name_is_skipped() {
        let text = r#"game ( name "G" rom ( size 5 crc 00 ) rom ( name "ok.bin" size 5 ) )"#;
        let records = ok(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].rom_name, "ok.bin");
    }

    #[test]
    fn test_resource_and_missing_name() {
        let text = r#"resource ( description "bios" rom ( name "bios.bin" size 8 ) )"#;
        let records = ok(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].game_name, "Unknown");
        assert_eq!(records[0].title, "Unknown");
        assert_eq!(records[0].description, "bios");
    }

    #[test]
    fn test_unterminated_block_is_error() {
        let text = r#"game ( name "ok" rom ( name "a" size 1 ) )
game ( name "broken" rom ( name "b" size 1 )"#;
        let out = parse(text);
        assert_eq!(out.len(), 2);
        assert!(out[0].is_ok());
        assert!(matches!(out[1], Err(ParseError::Cmp { .. })));
    }

    #[test]
    fn test_bad_size_is_error() {
        let out = parse(r#"game ( name "g" rom ( name "x" size huge ) )"#);
        assert!(matches!(out[0], Err(ParseError::Size { .. })));
    }

    #[test]
    fn test_bare_flag_does_not_shift_fields() {
        let text = r#"game ( name "g"
    rom ( name "x.bin" baddump size 5 crc 0a0b0c0d )
    rom ( name "y.bin" size 6 nodump crc 01020304 md5 00112233 )
    rom ( name "z.bin" region size 7 crc 05060708 )
)"#;
        let records = ok(text);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].size, 5);
        assert_eq!(records[0].crc, "0a0b0c0d");
        assert_eq!(records[1].size, 6);
        assert_eq!(records[1].crc, "01020304");
        assert_eq!(records[1].md5, "00112233");
        assert_eq!(records[2].size, 7);
        assert_eq!(records[2].crc, "05060708");
    }
}
