// Tests for rune page validation and application


#[cfg(test)]
mod test_validation;

#[cfg(test)]
mod test_applier;
