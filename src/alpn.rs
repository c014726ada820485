//! Application-Layer Protocol Negotiation (RFC 7301).
//!
//! Selection is a plain function over parsed protocol lists. The library's
//! selection hook hands us the client's offer in wire form; we parse it,
//! pick an entry, and hand back a sub-slice of that same offer.
//!
//! Order: [`SelectionOrder::ServerPreference`] (the default) walks the
//! server's supported list and takes the first id the client also offered.
//! This matches OpenSSL's own `SSL_select_next_proto`.

/// Outcome of a negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiation<'a> {
    /// The agreed protocol id, borrowed from the client's offer.
    Selected(&'a [u8]),
    /// No common protocol; the handshake proceeds without one.
    NoAcknowledgement,
}

impl<'a> Negotiation<'a> {
    pub fn selected(&self) -> Option<&'a [u8]> {
        match *self {
            Negotiation::Selected(p) => Some(p),
            Negotiation::NoAcknowledgement => None,
        }
    }
}

/// Whose list order breaks ties when several ids are common to both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionOrder {
    /// First id in the server's supported list that the client offered.
    #[default]
    ServerPreference,
    /// First id in the client's offer that the server supports.
    ClientPreference,
}

/// Wire form error: a length prefix runs past the end, or an id is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MalformedList;

/// A protocol list in wire form: each id prefixed by a one-byte length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolList<'a> {
    wire: &'a [u8],
}

impl<'a> ProtocolList<'a> {
    /// Validate `wire` and wrap it.
    pub fn parse(wire: &'a [u8]) -> Result<Self, MalformedList> {
        let mut off = 0;
        while off < wire.len() {
            let len = wire[off] as usize;
            if len == 0 || off + 1 + len > wire.len() {
                return Err(MalformedList);
            }
            off += 1 + len;
        }
        Ok(Self { wire })
    }

    /// Iterate the ids in wire order.
    pub fn iter(&self) -> ProtocolIter<'a> {
        ProtocolIter { rest: self.wire }
    }

    pub fn is_empty(&self) -> bool {
        self.wire.is_empty()
    }
}

/// Iterator over the ids of a [`ProtocolList`].
pub struct ProtocolIter<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for ProtocolIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let (&len, tail) = self.rest.split_first()?;
        let (id, rest) = tail.split_at(len as usize);
        self.rest = rest;
        Some(id)
    }
}

/// Encode ids into wire form. Empty ids and ids longer than 255 bytes are
/// skipped.
pub fn encode<P: AsRef<[u8]>>(protocols: &[P]) -> Vec<u8> {
    let mut out = Vec::new();
    for p in protocols {
        let p = p.as_ref();
        if p.is_empty() || p.len() > u8::MAX as usize {
            log::warn!("alpn: skipping protocol id of length {}", p.len());
            continue;
        }
        out.push(p.len() as u8);
        out.extend_from_slice(p);
    }
    out
}

/// Pick a protocol from `offered` (client order) against `supported`
/// (server order).
pub fn negotiate<'a, O, S>(offered: O, supported: &[S], order: SelectionOrder) -> Negotiation<'a>
where
    O: IntoIterator<Item = &'a [u8]>,
    S: AsRef<[u8]>,
{
    let offered: Vec<&'a [u8]> = offered.into_iter().collect();
    let found = match order {
        SelectionOrder::ServerPreference => supported
            .iter()
            .find_map(|s| offered.iter().copied().find(|o| *o == s.as_ref())),
        SelectionOrder::ClientPreference => offered
            .iter()
            .copied()
            .find(|o| supported.iter().any(|s| s.as_ref() == *o)),
    };
    match found {
        Some(p) => Negotiation::Selected(p),
        None => Negotiation::NoAcknowledgement,
    }
}

/// Negotiate directly against a client offer in wire form.
pub fn negotiate_wire<'a, S: AsRef<[u8]>>(
    client_wire: &'a [u8],
    supported: &[S],
    order: SelectionOrder,
) -> Result<Negotiation<'a>, MalformedList> {
    let offered = ProtocolList::parse(client_wire)?;
    Ok(negotiate(offered.iter(), supported, order))
}

/// Server-side ALPN policy, shared by every engine of a context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlpnPolicy {
    pub supported: Vec<Vec<u8>>,
    pub order: SelectionOrder,
}

impl AlpnPolicy {
    pub fn new<P: AsRef<[u8]>>(supported: &[P], order: SelectionOrder) -> Self {
        Self {
            supported: supported.iter().map(|p| p.as_ref().to_vec()).collect(),
            order,
        }
    }

    pub fn select<'a>(&self, client_wire: &'a [u8]) -> Result<Negotiation<'a>, MalformedList> {
        negotiate_wire(client_wire, &self.supported, self.order)
    }
}
