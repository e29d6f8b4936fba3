// Per-flight fare reduction: at most one fare per cabin, the cheapest in miles.
use crate::error::SourceError;
use crate::schema::{FareCandidate, FareRecord};

/// Keeps the lowest-miles fare for each cabin.
///
/// Ties keep the fare encountered first, so callers control precedence through
/// input order. Output cabins appear in the order they were first seen.
pub fn lowest_per_cabin<I>(fares: I) -> Vec<FareRecord>
where
    I: IntoIterator<Item = FareRecord>,
{
    fares.into_iter().fold(Vec::new(), |mut kept: Vec<FareRecord>, fare| {
        let slot = kept.iter().position(|existing| existing.cabin == fare.cabin);
        match slot {
            Some(index) if fare.miles_required < kept[index].miles_required => {
                kept[index] = fare;
            }
            Some(_) => {}
            None => kept.push(fare),
        }
        kept
    })
}

/// Validates and reduces the raw fares an adapter extracted for one flight.
///
/// A candidate without a cabin means the adapter let an unmapped code through,
/// which fails the whole flight instead of dropping the fare.
pub fn reduce_candidates(
    carrier: &str,
    flight_number: &str,
    candidates: Vec<FareCandidate>,
) -> Result<Vec<FareRecord>, SourceError> {
    let fares = candidates
        .into_iter()
        .map(|candidate| match candidate.cabin {
            Some(cabin) => Ok(candidate.into_fare(cabin)),
            None => Err(SourceError::UnknownCabin {
                carrier: carrier.to_string(),
                flight_number: flight_number.to_string(),
                code: candidate.raw_code,
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(lowest_per_cabin(fares))
}
