use tokio_modbus::{Address, Quantity};

use super::span::*;

#[derive(Clone, Debug)]
pub struct Batch<TSpan: Span> {
  pub address: Address,
  pub quantity: Quantity,
  pub spans: Vec<TSpan>,
}

#[derive(Debug, thiserror::Error)]
pub enum MapError {
  #[error("batch at {address} expected {expected} words, got {got}")]
  TruncatedResponse {
    address: Address,
    expected: Quantity,
    got: usize,
  },
}

impl<TSpan: Span> Span for Batch<TSpan> {
  fn address(&self) -> Address {
    self.address
  }

  fn quantity(&self) -> Quantity {
    self.quantity
  }
}

impl<TSpan: Span, TSpanParser: Span + SpanParser<TSpan>>
  SpanParser<Batch<TSpan>> for Batch<TSpanParser>
{
  fn parse<TIntoIterator>(
    &self,
    data: TIntoIterator,
  ) -> anyhow::Result<Batch<TSpan>>
  where
    TIntoIterator: IntoIterator<Item = u16>,
  {
    let data = data.into_iter().collect::<Vec<_>>();
    if data.len() < self.quantity as usize {
      return Err(
        MapError::TruncatedResponse {
          address: self.address,
          expected: self.quantity,
          got: data.len(),
        }
        .into(),
      );
    }

    let mut registers = Vec::with_capacity(self.spans.len());
    for register in &self.spans {
      let start = (register.address() - self.address) as usize;
      let end = start + register.quantity() as usize;
      let slice = data.get(start..end).ok_or(MapError::TruncatedResponse {
        address: self.address,
        expected: self.quantity,
        got: data.len(),
      })?;
      let parsed = register.parse(slice.iter().cloned())?;
      registers.push(parsed);
    }

    Ok(Batch::<TSpan> {
      address: self.address,
      quantity: self.quantity,
      spans: registers,
    })
  }
}

impl<TSpan: Span, TSpanParser: Span + SpanParser<TSpan>>
  SpanParser<Batch<TSpan>> for &Batch<TSpanParser>
{
  fn parse<TIntoIterator>(
    &self,
    data: TIntoIterator,
  ) -> anyhow::Result<Batch<TSpan>>
  where
    TIntoIterator: IntoIterator<Item = u16>,
  {
    <Batch<TSpanParser> as SpanParser<Batch<TSpan>>>::parse(*self, data)
  }
}

/// Merge spans into as few contiguous reads as possible. A span joins the
/// current batch while it starts within `tolerance` words of the batch end
/// and the merged batch stays at or under `max_quantity` words. Overlapping
/// and duplicate addresses merge without inflating the batch. Batches come
/// out sorted by start address.
pub fn batch_spans<TSpan: Span, TIntoIterator: IntoIterator<Item = TSpan>>(
  spans: TIntoIterator,
  tolerance: Quantity,
  max_quantity: Quantity,
) -> Vec<Batch<TSpan>> {
  let mut spans = spans.into_iter().collect::<Vec<_>>();
  spans.sort_by_key(|span| span.address());

  let mut iter = spans.into_iter();
  let first = match iter.next() {
    Some(first) => first,
    None => return Vec::new(),
  };
  let mut batches = Vec::new();
  let mut current = Batch::<TSpan> {
    address: first.address(),
    quantity: first.quantity(),
    spans: vec![first],
  };

  for span in iter {
    let end = current.address.saturating_add(current.quantity);
    let span_end = span.address().saturating_add(span.quantity());
    let merged = span_end.max(end) - current.address;
    if span.address() <= end.saturating_add(tolerance)
      && merged <= max_quantity
    {
      current.quantity = merged;
      current.spans.push(span);
    } else {
      batches.push(current);
      current = Batch::<TSpan> {
        address: span.address(),
        quantity: span.quantity(),
        spans: vec![span],
      }
    }
  }
  batches.push(current);

  batches
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
  use super::*;
  use crate::modbus::register::*;

  fn span(address: Address) -> SimpleSpan {
    SimpleSpan {
      address,
      quantity: 1,
    }
  }

  #[test]
  fn contiguous_runs_split_on_holes() {
    let batches = batch_spans(
      [span(50), span(10), span(12), span(51), span(11)],
      0,
      125,
    );
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].address, 10);
    assert_eq!(batches[0].quantity, 3);
    assert_eq!(batches[1].address, 50);
    assert_eq!(batches[1].quantity, 2);
  }

  #[test]
  fn tolerance_bridges_small_holes() {
    let batches = batch_spans([span(10), span(14)], 3, 125);
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].address, 10);
    assert_eq!(batches[0].quantity, 5);
  }

  #[test]
  fn duplicate_addresses_do_not_inflate_the_batch() {
    let batches = batch_spans([span(10), span(10), span(11)], 0, 125);
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].quantity, 2);
    assert_eq!(batches[0].spans.len(), 3);
  }

  #[test]
  fn max_quantity_caps_a_batch() {
    let batches = batch_spans([span(10), span(11), span(12)], 0, 2);
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].quantity, 2);
    assert_eq!(batches[1].address, 12);
  }

  #[test]
  fn oversized_span_still_forms_its_own_batch() {
    let wide = SimpleSpan {
      address: 10,
      quantity: 200,
    };
    let batches = batch_spans([wide, span(300)], 0, 125);
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].quantity, 200);
  }

  #[test]
  fn empty_input_yields_no_batches() {
    let batches = batch_spans(std::iter::empty::<SimpleSpan>(), 0, 125);
    assert!(batches.is_empty());
  }

  fn kind_register(
    address: Address,
  ) -> HoldingRegister<RegisterKindStorage> {
    HoldingRegister {
      address,
      storage: RegisterKindStorage::U16(NumericRegisterKind::PLAIN),
      name: "pv1_in_power",
      suffix: "W",
    }
  }

  #[test]
  fn response_maps_onto_members_by_offset() {
    let batches =
      batch_spans([kind_register(672), kind_register(674)], 1, 125);
    assert_eq!(batches.len(), 1);
    let parsed = batches[0].parse([100u16, 0u16, 300u16]).unwrap();
    assert_eq!(parsed.spans[0].storage.raw(), &[100]);
    assert_eq!(parsed.spans[1].storage.raw(), &[300]);
  }

  #[test]
  fn mapping_twice_is_idempotent() {
    let batches =
      batch_spans([kind_register(672), kind_register(673)], 0, 125);
    let response = [100u16, 200u16];
    let first = batches[0].parse(response).unwrap();
    let second = batches[0].parse(response).unwrap();
    assert_eq!(first.spans, second.spans);
  }

  #[test]
  fn truncated_response_decodes_nothing() {
    let batches =
      batch_spans([kind_register(672), kind_register(673)], 0, 125);
    let error = batches[0].parse([100u16]).unwrap_err();
    assert!(error.downcast_ref::<MapError>().is_some());
  }
}
