// Tests for the automation state machine and action dispatch
