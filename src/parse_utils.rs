use crate::errors::*;
use crate::template::Region;

pub fn trim_ascii_whitespace(b: &[u8]) -> Option<&[u8]> {
    let start = b.iter().position(|&c| !c.is_ascii_whitespace())?;
    let end = b.iter().rposition(|&c| !c.is_ascii_whitespace())?;
    Some(&b[start..=end])
}

/// Split a compact template string into regions.
///
/// Runs of `-` become variable regions and every other run becomes a constant region,
/// e.g. `ACGT----TT` is `[Constant(ACGT), Variable(4), Constant(TT)]`.
pub fn parse_template(template: &[u8]) -> Result<Vec<Region>> {
    let template = trim_ascii_whitespace(template).ok_or_else(|| Error::Config {
        context: "template",
        reason: "template is empty".to_owned(),
    })?;

    let mut res = Vec::new();
    let mut curr = Vec::new();
    let mut variable = 0;

    for &c in template {
        match c {
            b'-' => {
                if !curr.is_empty() {
                    res.push(Region::Constant(std::mem::take(&mut curr)));
                }
                variable += 1;
            }
            c if c.is_ascii_whitespace() => {
                Err(Error::Config {
                    context: "template",
                    reason: format!("whitespace inside template \"{}\"", utf8(template)),
                })?;
            }
            _ => {
                if variable > 0 {
                    res.push(Region::Variable(variable));
                    variable = 0;
                }
                curr.push(c);
            }
        }
    }

    if variable > 0 {
        res.push(Region::Variable(variable));
    }

    if !curr.is_empty() {
        res.push(Region::Constant(curr));
    }

    Ok(res)
}
