//! IMAP response parsing.
//!
//! Only the responses the mail store client consumes are decoded into
//! structured values; everything else is kept as [`Response::Other`].

use crate::flag::Flag;
use crate::{Error, Result};

/// Status of a tagged or untagged status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command completed successfully.
    Ok,
    /// Command failed.
    No,
    /// Command was malformed or unexpected.
    Bad,
    /// Connection starts already authenticated.
    PreAuth,
    /// Server is closing the connection.
    Bye,
}

impl Status {
    fn parse(atom: &str) -> Option<Self> {
        match atom.to_ascii_uppercase().as_str() {
            "OK" => Some(Self::Ok),
            "NO" => Some(Self::No),
            "BAD" => Some(Self::Bad),
            "PREAUTH" => Some(Self::PreAuth),
            "BYE" => Some(Self::Bye),
            _ => None,
        }
    }
}

/// Data items of one FETCH response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchData {
    /// Message sequence number.
    pub seq: u32,
    /// FLAGS item, if present.
    pub flags: Option<Vec<Flag>>,
    /// Full message bytes from `BODY[]` or `RFC822`, if present.
    pub body: Option<Vec<u8>>,
}

/// A parsed server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Completion of a tagged command.
    Tagged {
        /// Tag echoed from the command.
        tag: String,
        /// Completion status.
        status: Status,
        /// Human-readable text, including any response code.
        text: String,
    },
    /// Untagged OK/NO/BAD/PREAUTH/BYE.
    Status {
        /// Status.
        status: Status,
        /// Human-readable text, including any response code.
        text: String,
    },
    /// `* CAPABILITY ...`.
    Capability(Vec<String>),
    /// `* n EXISTS`.
    Exists(u32),
    /// `* SEARCH n n n`.
    Search(Vec<u32>),
    /// `* n FETCH (...)`.
    Fetch(FetchData),
    /// `+ ...` continuation request.
    Continuation(String),
    /// Anything else.
    Other(String),
}

impl Response {
    /// Parses one complete response as returned by
    /// [`FramedStream::read_response`](crate::framed::FramedStream::read_response).
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the response is malformed.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);

        if cursor.eat(b'+') {
            cursor.skip_spaces();
            return Ok(Self::Continuation(cursor.rest_of_line()));
        }

        if cursor.eat(b'*') {
            cursor.expect(b' ')?;
            return parse_untagged(&mut cursor);
        }

        let tag = cursor.atom()?;
        cursor.expect(b' ')?;
        let status_atom = cursor.atom()?;
        let status = Status::parse(&status_atom)
            .ok_or_else(|| Error::Protocol(format!("unknown status {status_atom:?}")))?;
        cursor.skip_spaces();
        Ok(Self::Tagged {
            tag,
            status,
            text: cursor.rest_of_line(),
        })
    }
}

fn parse_untagged(cursor: &mut Cursor<'_>) -> Result<Response> {
    let first = cursor.atom()?;

    if let Ok(number) = first.parse::<u32>() {
        cursor.expect(b' ')?;
        let keyword = cursor.atom()?.to_ascii_uppercase();
        return match keyword.as_str() {
            "EXISTS" => Ok(Response::Exists(number)),
            "FETCH" => {
                cursor.expect(b' ')?;
                parse_fetch(cursor, number).map(Response::Fetch)
            }
            _ => Ok(Response::Other(format!("{number} {keyword}"))),
        };
    }

    let keyword = first.to_ascii_uppercase();
    if let Some(status) = Status::parse(&keyword) {
        cursor.skip_spaces();
        return Ok(Response::Status {
            status,
            text: cursor.rest_of_line(),
        });
    }

    match keyword.as_str() {
        "CAPABILITY" => Ok(Response::Capability(
            cursor
                .rest_of_line()
                .split_whitespace()
                .map(str::to_string)
                .collect(),
        )),
        "SEARCH" => {
            let numbers = cursor
                .rest_of_line()
                .split_whitespace()
                .map(|n| {
                    n.parse()
                        .map_err(|_| Error::Protocol(format!("invalid SEARCH number {n:?}")))
                })
                .collect::<Result<Vec<u32>>>()?;
            Ok(Response::Search(numbers))
        }
        _ => Ok(Response::Other(format!("{keyword} {}", cursor.rest_of_line()))),
    }
}

fn parse_fetch(cursor: &mut Cursor<'_>, seq: u32) -> Result<FetchData> {
    let mut data = FetchData {
        seq,
        ..FetchData::default()
    };

    cursor.expect(b'(')?;
    loop {
        cursor.skip_spaces();
        if cursor.eat(b')') {
            return Ok(data);
        }

        let name = cursor.item_name()?.to_ascii_uppercase();
        cursor.skip_spaces();

        if name == "FLAGS" {
            data.flags = Some(cursor.flag_list()?);
        } else if name == "BODY[]" || name == "RFC822" {
            data.body = cursor.nstring()?;
        } else {
            cursor.skip_value()?;
        }
    }
}

/// Byte cursor over a single response.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.eat(byte) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected {:?}", char::from(byte))))
        }
    }

    fn unexpected(&self, what: &str) -> Error {
        Error::Protocol(format!("{what} at offset {}", self.pos))
    }

    fn skip_spaces(&mut self) {
        while self.eat(b' ') {}
    }

    fn take_while(&mut self, keep: impl Fn(u8) -> bool) -> &'a [u8] {
        let start = self.pos;
        while self.peek().is_some_and(&keep) {
            self.pos += 1;
        }
        &self.data[start..self.pos]
    }

    fn atom(&mut self) -> Result<String> {
        let atom = self.take_while(|b| !matches!(b, b' ' | b'(' | b')' | b'\r' | b'\n'));
        if atom.is_empty() {
            return Err(self.unexpected("expected atom"));
        }
        Ok(String::from_utf8_lossy(atom).into_owned())
    }

    /// Reads a FETCH item name, including any `[section]` and `<partial>`.
    fn item_name(&mut self) -> Result<String> {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(b) = self.peek() {
            match b {
                b'[' => depth += 1,
                b']' => depth = depth.saturating_sub(1),
                b' ' | b'(' | b')' | b'\r' | b'\n' if depth == 0 => break,
                b'\r' | b'\n' => return Err(self.unexpected("unterminated section")),
                _ => {}
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.unexpected("expected fetch item"));
        }
        Ok(String::from_utf8_lossy(&self.data[start..self.pos]).into_owned())
    }

    fn flag_list(&mut self) -> Result<Vec<Flag>> {
        self.expect(b'(')?;
        let mut flags = Vec::new();
        loop {
            self.skip_spaces();
            if self.eat(b')') {
                return Ok(flags);
            }
            flags.push(Flag::parse(&self.atom()?));
        }
    }

    fn nstring(&mut self) -> Result<Option<Vec<u8>>> {
        match self.peek() {
            Some(b'"') => self.quoted().map(Some),
            Some(b'{') => self.literal().map(|bytes| Some(bytes.to_vec())),
            _ => {
                let atom = self.atom()?;
                if atom.eq_ignore_ascii_case("NIL") {
                    Ok(None)
                } else {
                    Err(self.unexpected("expected string or NIL"))
                }
            }
        }
    }

    fn quoted(&mut self) -> Result<Vec<u8>> {
        self.expect(b'"')?;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None | Some(b'\r' | b'\n') => return Err(self.unexpected("unterminated string")),
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let escaped = self
                        .peek()
                        .ok_or_else(|| self.unexpected("dangling escape"))?;
                    out.push(escaped);
                    self.pos += 1;
                }
                Some(b) => {
                    out.push(b);
                    self.pos += 1;
                }
            }
        }
    }

    fn literal(&mut self) -> Result<&'a [u8]> {
        self.expect(b'{')?;
        let digits = self.take_while(|b| b.is_ascii_digit());
        let len: usize = std::str::from_utf8(digits)
            .ok()
            .and_then(|d| d.parse().ok())
            .ok_or_else(|| self.unexpected("invalid literal length"))?;
        self.eat(b'+');
        self.expect(b'}')?;
        self.expect(b'\r')?;
        self.expect(b'\n')?;

        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| self.unexpected("truncated literal"))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn skip_value(&mut self) -> Result<()> {
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                loop {
                    self.skip_spaces();
                    if self.eat(b')') {
                        return Ok(());
                    }
                    self.skip_value()?;
                }
            }
            Some(b'"') => self.quoted().map(drop),
            Some(b'{') => self.literal().map(drop),
            _ => self.item_name().map(drop),
        }
    }

    fn rest_of_line(&mut self) -> String {
        let rest = self.take_while(|b| b != b'\r' && b != b'\n');
        String::from_utf8_lossy(rest).into_owned()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn tagged_completion() {
        let response = Response::parse(b"A0002 OK [READ-WRITE] SELECT completed\r\n").unwrap();
        assert_eq!(
            response,
            Response::Tagged {
                tag: "A0002".into(),
                status: Status::Ok,
                text: "[READ-WRITE] SELECT completed".into(),
            }
        );

        let response = Response::parse(b"A0003 no login failed\r\n").unwrap();
        assert!(matches!(
            response,
            Response::Tagged {
                status: Status::No,
                ..
            }
        ));
    }

    #[test]
    fn untagged_greeting_and_bye() {
        let response = Response::parse(b"* OK IMAP4rev1 ready\r\n").unwrap();
        assert_eq!(
            response,
            Response::Status {
                status: Status::Ok,
                text: "IMAP4rev1 ready".into(),
            }
        );
        let response = Response::parse(b"* BYE shutting down\r\n").unwrap();
        assert!(matches!(
            response,
            Response::Status {
                status: Status::Bye,
                ..
            }
        ));
    }

    #[test]
    fn exists_search_capability() {
        assert_eq!(
            Response::parse(b"* 23 EXISTS\r\n").unwrap(),
            Response::Exists(23)
        );
        assert_eq!(
            Response::parse(b"* SEARCH 2 5 9\r\n").unwrap(),
            Response::Search(vec![2, 5, 9])
        );
        assert_eq!(
            Response::parse(b"* SEARCH\r\n").unwrap(),
            Response::Search(vec![])
        );
        assert_eq!(
            Response::parse(b"* CAPABILITY IMAP4rev1 STARTTLS\r\n").unwrap(),
            Response::Capability(vec!["IMAP4rev1".into(), "STARTTLS".into()])
        );
    }

    #[test]
    fn fetch_with_literal_body_and_flags() {
        let raw = b"* 4 FETCH (UID 17 FLAGS (\\Seen $Work) BODY[] {11}\r\nHello\r\nBye!)\r\n";
        let Response::Fetch(data) = Response::parse(raw).unwrap() else {
            panic!("not a fetch");
        };
        assert_eq!(data.seq, 4);
        assert_eq!(
            data.flags,
            Some(vec![Flag::Seen, Flag::Keyword("$Work".into())])
        );
        assert_eq!(data.body.as_deref(), Some(&b"Hello\r\nBye!"[..]));
    }

    #[test]
    fn fetch_with_quoted_and_nil_body() {
        let Response::Fetch(data) = Response::parse(b"* 1 FETCH (BODY[] \"a \\\"b\\\"\")\r\n").unwrap()
        else {
            panic!("not a fetch");
        };
        assert_eq!(data.body.as_deref(), Some(&b"a \"b\""[..]));

        let Response::Fetch(data) = Response::parse(b"* 1 FETCH (RFC822 NIL)\r\n").unwrap() else {
            panic!("not a fetch");
        };
        assert_eq!(data.body, None);
    }

    #[test]
    fn fetch_skips_unknown_items() {
        let raw = b"* 2 FETCH (ENVELOPE (\"date\" NIL ((\"A\" NIL \"a\" \"x.test\"))) BODY[HEADER.FIELDS (SUBJECT)] {4}\r\nx\r\n FLAGS ())\r\n";
        let Response::Fetch(data) = Response::parse(raw).unwrap() else {
            panic!("not a fetch");
        };
        assert_eq!(data.flags, Some(vec![]));
        assert_eq!(data.body, None);
    }

    #[test]
    fn truncated_literal_is_an_error() {
        assert!(Response::parse(b"* 1 FETCH (BODY[] {50}\r\nshort)\r\n").is_err());
    }

    #[test]
    fn continuation() {
        assert_eq!(
            Response::parse(b"+ Ready for literal\r\n").unwrap(),
            Response::Continuation("Ready for literal".into())
        );
    }

    proptest! {
        #[test]
        fn literal_body_survives_any_bytes(body in proptest::collection::vec(any::<u8>(), 0..512)) {
            let mut raw = format!("* 9 FETCH (BODY[] {{{}}}\r\n", body.len()).into_bytes();
            raw.extend_from_slice(&body);
            raw.extend_from_slice(b")\r\n");

            let Response::Fetch(data) = Response::parse(&raw).unwrap() else {
                panic!("not a fetch");
            };
            prop_assert_eq!(data.body, Some(body));
        }

        #[test]
        fn parser_never_panics(raw in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = Response::parse(&raw);
        }
    }
}
