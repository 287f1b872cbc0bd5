// Tests for acquisition strategies, selection and normalization

#[cfg(test)]
mod test_normalizer;

#[cfg(test)]
mod test_selector;
