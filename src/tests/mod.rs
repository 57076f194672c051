mod test_assembler;
