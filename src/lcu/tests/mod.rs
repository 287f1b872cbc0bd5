// Tests for client discovery and the connection layer
