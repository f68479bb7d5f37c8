//! Streaming extraction from Logiqx / MAME XML DAT files
//!
//! The reader walks events in document order and holds only the ROM list of
//! the game currently open. Each `<game>` or `<machine>` element produces one
//! [`RomRecord`] per direct-child `<rom>` element once the element closes.

use crate::catalog::{CatalogFile, GameEntry, RawRom, RomRecord};
use crate::error::{ParseError, ParseResult};
use crate::parser::size::normalize_size;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Read buffer for the underlying file
const READ_BUFFER: usize = 64 * 1024;

/// The game element currently being assembled
#[derive(Debug)]
struct OpenGame {
    /// Element depth of the `<game>` tag
    depth: usize,
    name: String,
    description: String,
    in_description: bool,
    roms: Vec<RawRom>,
}

/// Lazy record iterator over one XML DAT file
pub struct XmlRecords<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    file: CatalogFile,

    /// Number of currently open elements
    depth: usize,

    game: Option<OpenGame>,
    pending: VecDeque<RomRecord>,
    done: bool,
}

impl XmlRecords<BufReader<File>> {
    /// Open a catalog file for streaming
    pub fn open(file: &CatalogFile) -> ParseResult<Self> {
        let handle = File::open(&file.path).map_err(|source| ParseError::Io {
            path: file.path.clone(),
            source,
        })?;
        Ok(Self::from_reader(
            file.clone(),
            BufReader::with_capacity(READ_BUFFER, handle),
        ))
    }
}

impl<R: BufRead> XmlRecords<R> {
    /// Stream records from any buffered reader
    pub fn from_reader(file: CatalogFile, source: R) -> Self {
        // Description text is kept exactly as written
        let reader = Reader::from_reader(source);

        Self {
            reader,
            buf: Vec::with_capacity(4096),
            file,
            depth: 0,
            game: None,
            pending: VecDeque::new(),
            done: false,
        }
    }

    fn path(&self) -> &Path {
        &self.file.path
    }

    fn malformed(&self, reason: impl Into<String>) -> ParseError {
        ParseError::Xml {
            path: self.path().to_path_buf(),
            position: self.reader.buffer_position(),
            reason: reason.into(),
        }
    }

    fn map_xml_error(&self, err: quick_xml::Error) -> ParseError {
        match err {
            quick_xml::Error::Io(e) => ParseError::Io {
                path: self.path().to_path_buf(),
                source: io::Error::new(e.kind(), e.to_string()),
            },
            other => self.malformed(other.to_string()),
        }
    }

    /// Read the attributes of a `<rom>` element
    fn read_rom(&self, e: &BytesStart) -> ParseResult<RawRom> {
        let mut rom = RawRom::default();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| self.malformed(err.to_string()))?;
            let value = attr
                .unescape_value()
                .map_err(|err| self.map_xml_error(err))?
                .into_owned();
            match attr.key.local_name().as_ref() {
                b"name" => rom.name = value,
                b"size" => rom.size = Some(value),
                b"crc" => rom.crc = Some(value),
                b"md5" => rom.md5 = Some(value),
                b"sha1" => rom.sha1 = Some(value),
                b"status" => rom.status = Some(value),
                _ => {}
            }
        }
        Ok(rom)
    }

    fn read_name(&self, e: &BytesStart) -> ParseResult<String> {
        for attr in e.attributes() {
            let attr = attr.map_err(|err| self.malformed(err.to_string()))?;
            if attr.key.local_name().as_ref() == b"name" {
                return Ok(attr
                    .unescape_value()
                    .map_err(|err| self.map_xml_error(err))?
                    .into_owned());
            }
        }
        Ok(String::new())
    }

    /// Handle an opening (or self-closing) tag at element depth `level`
    fn open_element(&mut self, e: &BytesStart, level: usize, empty: bool) -> ParseResult<()> {
        let local = e.local_name();
        let tag = local.as_ref();

        let game_depth = self.game.as_ref().map(|g| g.depth);

        match game_depth {
            None if tag == b"game" || tag == b"machine" => {
                // A self-closing game has no ROMs and yields nothing
                if empty {
                    return Ok(());
                }
                let name = self.read_name(e)?;
                self.game = Some(OpenGame {
                    depth: level,
                    name,
                    description: String::new(),
                    in_description: false,
                    roms: Vec::new(),
                });
            }
            Some(depth) if level == depth + 1 => match tag {
                b"rom" => {
                    let rom = self.read_rom(e)?;
                    if let Some(game) = self.game.as_mut() {
                        game.roms.push(rom);
                    }
                }
                b"description" if !empty => {
                    if let Some(game) = self.game.as_mut() {
                        game.in_description = true;
                    }
                }
                _ => {}
            },
            _ => {}
        }
        Ok(())
    }

    /// Handle a closing tag at element depth `level`
    fn close_element(&mut self, level: usize) -> ParseResult<()> {
        let Some(game) = self.game.as_mut() else {
            return Ok(());
        };
        if level == game.depth + 1 {
            game.in_description = false;
        } else if level == game.depth {
            if let Some(game) = self.game.take() {
                self.emit(game)?;
            }
        }
        Ok(())
    }

    /// Turn a completed game into pending records
    fn emit(&mut self, game: OpenGame) -> ParseResult<()> {
        let entry = GameEntry::new(&game.name, &game.description);
        for rom in game.roms {
            if rom.name.is_empty() {
                continue;
            }
            let size = normalize_size(rom.size.as_deref()).map_err(|source| ParseError::Size {
                path: self.file.path.clone(),
                rom: rom.name.clone(),
                source,
            })?;
            self.pending
                .push_back(RomRecord::assemble(&self.file, &entry, rom, size));
        }
        Ok(())
    }

    fn append_description(&mut self, text: &str) {
        if let Some(game) = self.game.as_mut() {
            if game.in_description {
                game.description.push_str(text);
            }
        }
    }

    /// Consume one XML event
    fn step(&mut self) -> ParseResult<()> {
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        let result = self.handle_next(&mut buf);
        self.buf = buf;
        result
    }

    fn handle_next(&mut self, buf: &mut Vec<u8>) -> ParseResult<()> {
        let event = self
            .reader
            .read_event_into(buf)
            .map_err(|e| self.map_xml_error(e))?;

        match event {
            Event::Start(ref e) => {
                let level = self.depth + 1;
                self.open_element(e, level, false)?;
                self.depth = level;
            }
            Event::Empty(ref e) => {
                self.open_element(e, self.depth + 1, true)?;
            }
            Event::End(_) => {
                let level = self.depth;
                self.close_element(level)?;
                self.depth = self.depth.saturating_sub(1);
            }
            Event::Text(ref e) => {
                let text = e.unescape().map_err(|err| self.map_xml_error(err))?;
                self.append_description(&text);
            }
            Event::CData(e) => {
                let raw = e.into_inner();
                self.append_description(&String::from_utf8_lossy(&raw));
            }
            Event::Eof => {
                if self.game.is_some() {
                    return Err(self.malformed("unexpected end of file inside game element"));
                }
                self.done = true;
            }
            _ => {}
        }
        Ok(())
    }
}

impl<R: BufRead> Iterator for XmlRecords<R> {
    type Item = ParseResult<RomRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(Ok(record));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.step() {
                self.done = true;
                self.pending.clear();
                self.game = None;
                return Some(Err(e));
            }
        }
    }
}
