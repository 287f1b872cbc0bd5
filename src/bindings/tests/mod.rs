// Tests for binding injection
