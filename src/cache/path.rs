use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
    CatchAll(String),
}

impl Segment {
    fn rank(&self) -> u8 {
        match self {
            Segment::Static(_) => 0,
            Segment::Param(_) => 1,
            Segment::CatchAll(_) => 2,
        }
    }
}

/// Compiled subscription path.
///
/// `/users/:id` captures one segment as `id`; a trailing `/files/*rest`
/// captures the remainder of the path (possibly empty) as `rest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(path: &str) -> Result<Self, String> {
        if !path.starts_with('/') {
            return Err(format!("path {:?} must start with '/'", path));
        }

        let trimmed = path.trim_start_matches('/').trim_end_matches('/');
        let mut segments = Vec::new();
        if !trimmed.is_empty() {
            let parts: Vec<&str> = trimmed.split('/').collect();
            let last = parts.len() - 1;
            for (i, part) in parts.into_iter().enumerate() {
                segments.push(Self::parse_segment(path, part, i == last)?);
            }
        }

        Ok(Self {
            raw: path.to_string(),
            segments,
        })
    }

    fn parse_segment(
        path: &str,
        part: &str,
        is_last: bool,
    ) -> Result<Segment, String> {
        if part.is_empty() {
            return Err(format!("path {:?} contains an empty segment", path));
        }
        if let Some(name) = part.strip_prefix(':') {
            if name.is_empty() {
                return Err(format!("path {:?} has an unnamed parameter", path));
            }
            return Ok(Segment::Param(name.to_string()));
        }
        if let Some(name) = part.strip_prefix('*') {
            if name.is_empty() {
                return Err(format!("path {:?} has an unnamed wildcard", path));
            }
            if !is_last {
                return Err(format!("path {:?}: wildcard must be the last segment", path));
            }
            return Ok(Segment::CatchAll(name.to_string()));
        }
        if part.contains(':') || part.contains('*') {
            return Err(format!("path {:?}: ':' and '*' may only start a segment", path));
        }
        Ok(Segment::Static(part.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_static(&self) -> bool {
        self.segments.iter().all(|s| matches!(s, Segment::Static(_)))
    }

    /// Matches a request path, returning captured parameters.
    pub fn matches(
        &self,
        path: &str,
    ) -> Option<BTreeMap<String, String>> {
        let trimmed = path.trim_start_matches('/').trim_end_matches('/');
        let parts: Vec<&str> = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.split('/').collect()
        };

        let mut params = BTreeMap::new();
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Static(expected) => {
                    if parts.get(i) != Some(&expected.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = parts.get(i).filter(|v| !v.is_empty())?;
                    params.insert(name.clone(), value.to_string());
                }
                Segment::CatchAll(name) => {
                    let rest = parts.get(i..).map(|p| p.join("/")).unwrap_or_default();
                    params.insert(name.clone(), rest);
                    return Some(params);
                }
            }
        }

        (parts.len() == self.segments.len()).then_some(params)
    }

    /// Orders two patterns that match the same path: static beats `:param`,
    /// which beats `*catchall`, compared segment by segment.
    pub fn specificity_cmp(
        &self,
        other: &PathPattern,
    ) -> Ordering {
        let lhs = self.segments.iter().map(Segment::rank);
        let rhs = other.segments.iter().map(Segment::rank);
        lhs.cmp(rhs)
    }

    /// True when both patterns accept exactly the same request paths,
    /// regardless of parameter names.
    pub fn equivalent(
        &self,
        other: &PathPattern,
    ) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(other.segments.iter())
                .all(|(a, b)| match (a, b) {
                    (Segment::Static(x), Segment::Static(y)) => x == y,
                    (Segment::Param(_), Segment::Param(_)) => true,
                    (Segment::CatchAll(_), Segment::CatchAll(_)) => true,
                    _ => false,
                })
    }
}
